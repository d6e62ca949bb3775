use clap::Parser;
use miette::Result;
use linkcache::cli::{Cli, Commands};

fn main() -> Result<()> {
    // Reset SIGPIPE to default behavior (terminate silently) for proper Unix piping.
    // Without this, piping to `head`, `grep -q`, etc. causes a panic on broken pipe.
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    let global = cli.global;
    linkcache::core::logging::init(global.verbose, global.quiet);

    match cli.command {
        Commands::Check(args) => linkcache::cli::commands::check::run(args, &global),
        Commands::Load(args) => linkcache::cli::commands::load::run(args, &global),
        Commands::Status(args) => linkcache::cli::commands::status::run(args, &global),
        Commands::Reset(args) => linkcache::cli::commands::reset::run(args, &global),
        Commands::Graph(args) => linkcache::cli::commands::graph::run(args, &global),
        Commands::Watch(args) => linkcache::cli::commands::watch::run(args, &global),
        Commands::Completions(args) => linkcache::cli::commands::completions::run(args),
    }
}
