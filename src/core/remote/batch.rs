//! Collection metadata lookup
//!
//! Collections with a known remote id are looked up in batches; the rest
//! (and everything after a failed batch) one at a time.

use tracing::debug;

use super::{CollectionMeta, RemoteError, RemoteSource};
use crate::core::store::ValidStatus;

/// Most ids sent in one batch request
///
/// Longer id lists make the request URI too long for the remote.
pub const BATCH_LIMIT: usize = 50;

/// Look up the remote metadata of each flagged collection
///
/// Results come back in the order of `statuses`. Every known id is sent,
/// member collections included, since a source is not required to return
/// member collections it was not asked for. A failed batch request is
/// not reported as an error: it is usually caused by a missing login, and
/// the individual lookups that follow produce a precise error per
/// collection. Collections a batch response leaves out are also looked up
/// individually.
pub fn fetch_metadata<R: RemoteSource + ?Sized>(
    remote: &R,
    statuses: &[ValidStatus],
) -> Vec<Result<CollectionMeta, RemoteError>> {
    let mut results: Vec<Option<Result<CollectionMeta, RemoteError>>> =
        statuses.iter().map(|_| None).collect();

    let known: Vec<usize> = (0..statuses.len())
        .filter(|&i| !statuses[i].id.is_empty())
        .collect();

    for chunk in known.chunks(BATCH_LIMIT) {
        let mut ids: Vec<String> = chunk.iter().map(|&i| statuses[i].id.clone()).collect();
        // The batch endpoint wants at least two ids
        if ids.len() == 1 {
            ids.push(ids[0].clone());
        }

        match remote.list_collections(&ids) {
            Ok(metas) => {
                for &i in chunk {
                    let status = &statuses[i];
                    let found = metas
                        .iter()
                        .find(|m| m.id == status.id)
                        .or_else(|| metas.iter().find(|m| m.name == status.name));
                    if let Some(meta) = found {
                        results[i] = Some(Ok(meta.clone()));
                    }
                }
            }
            Err(e) => {
                // This chunk and every later one fall back to single lookups
                debug!("batch lookup failed ({}); looking collections up one by one", e);
                break;
            }
        }
    }

    statuses
        .iter()
        .zip(results)
        .map(|(status, result)| match result {
            Some(result) => result,
            None => remote.get_collection(&status.name),
        })
        .collect()
}
