use clap::Parser;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;

use bolt::{ConnectOptions, Connection, Map};

#[derive(Parser, Debug)]
#[clap(version, about = "Run one statement against a Bolt server", long_about = None)]
struct Args {
    #[clap(short, long, help = "username for authentication")]
    user: Option<String>,

    #[clap(short, long, help = "password for authentication")]
    password: Option<String>,

    #[clap(short, long, help = "print records only, without field names or summary")]
    quiet: bool,

    #[clap(help = "server URL, e.g. bolt://localhost:7687")]
    url: String,

    #[clap(help = "statement to run")]
    statement: String,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();

    let args = Args::parse();

    let mut opts = ConnectOptions::new();
    if let (Some(user), Some(password)) = (&args.user, &args.password) {
        opts = opts.credentials(user.clone(), password.clone());
    }

    let mut conn = Connection::open_with(&args.url, opts).wrap_err("connecting to server")?;
    let mut results = conn
        .run(&args.statement, Map::new())
        .wrap_err("running statement")?;

    let fields = results.fields()?;
    if !args.quiet && !fields.is_empty() {
        println!("{}", fields.join("\t"));
    }
    while let Some(record) = results.fetch_next()? {
        let row: Vec<String> = record.values().iter().map(|v| v.to_string()).collect();
        println!("{}", row.join("\t"));
    }

    if !args.quiet {
        if let Ok(counts) = results.update_counts() {
            for (name, count) in counts.nonzero() {
                eprintln!("{}: {}", name, count);
            }
        }
    }

    results.close()?;
    conn.close()?;
    Ok(())
}
