//! Command-line address lookup.
//!
//! One-shot queries against the address service, a scripted walk through the
//! cascade, reference number lookups and an interactive prompt that mirrors the
//! six dependent dropdowns of the lookup page.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use kepco_addr::{
    AddressLevel, AddressResolver, AddressSelection, Cascade, CascadeState, Config, KepcoClient,
};

#[derive(Parser, Debug)]
#[command(name = "lookup")]
#[command(about = "Look up KEPCO addresses and reference numbers")]
struct Args {
    /// Optional TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List provinces (시/도)
    Provinces,

    /// List the options of one level under the given ancestors
    Options {
        /// Level to list: province, city, district, town, village or lot
        #[arg(long)]
        level: AddressLevel,

        #[command(flatten)]
        address: AddressArgs,
    },

    /// Walk the cascade with the given values, printing each level's options
    Resolve {
        #[command(flatten)]
        address: AddressArgs,
    },

    /// Look up a record by reference number (전산번호)
    Esb {
        /// Reference number, e.g. 123-456-7890
        number: String,
    },

    /// Choose each level from a numbered list
    Interactive,
}

#[derive(ClapArgs, Debug, Default)]
struct AddressArgs {
    /// 시/도
    #[arg(long)]
    addr_do: Option<String>,
    /// 시
    #[arg(long)]
    addr_si: Option<String>,
    /// 구/군
    #[arg(long)]
    addr_gu: Option<String>,
    /// 동/면
    #[arg(long)]
    addr_lidong: Option<String>,
    /// 리
    #[arg(long)]
    addr_li: Option<String>,
    /// 상세번지
    #[arg(long)]
    addr_jibun: Option<String>,
}

impl AddressArgs {
    fn values(&self) -> [Option<&str>; AddressLevel::COUNT] {
        [
            self.addr_do.as_deref(),
            self.addr_si.as_deref(),
            self.addr_gu.as_deref(),
            self.addr_lidong.as_deref(),
            self.addr_li.as_deref(),
            self.addr_jibun.as_deref(),
        ]
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    debug!("Address service at {}", config.service.base_url);

    let client = KepcoClient::from_config(&config).context("Failed to create address client")?;
    let resolver = AddressResolver::new(client);

    match args.command {
        Command::Provinces => {
            let provinces = resolver.provinces().await.context("시/도 조회 실패")?;
            print_options(AddressLevel::Province, provinces.iter());
        }
        Command::Options { level, address } => {
            let selection = AddressSelection::from_values(address.values())?;
            let options = resolver
                .options_for(level, &selection)
                .await
                .with_context(|| format!("{} 조회 실패", level.label()))?;
            if options.is_empty() {
                println!("{}: no options", level.label());
            }
            print_options(level, options.iter());
        }
        Command::Resolve { address } => {
            resolve(&resolver, &address).await?;
        }
        Command::Esb { number } => {
            let response = resolver
                .lookup_by_reference_number(&number)
                .await
                .context("전산번호 검색 실패")?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Interactive => {
            let mut cascade = Cascade::new();
            if let Err(e) = cascade
                .apply_defaults(&resolver, &config.cascade.defaults)
                .await
            {
                warn!("Could not apply default selection: {}", e);
            }
            interactive(&resolver, &mut cascade).await?;
        }
    }

    Ok(())
}

/// Select the given values level by level, printing what each level offers
async fn resolve(resolver: &AddressResolver, address: &AddressArgs) -> Result<()> {
    let mut cascade = Cascade::new();

    for (level, value) in AddressLevel::all().iter().zip(address.values()) {
        cascade
            .refresh(resolver)
            .await
            .with_context(|| format!("{} 조회 실패", level.label()))?;

        if let Some(options) = cascade.options(*level) {
            print_options(*level, options.iter());
        }
        let Some(value) = value else {
            break;
        };
        cascade.select(*level, value)?;
    }
    cascade.refresh(resolver).await?;

    report(&cascade)
}

fn report(cascade: &Cascade) -> Result<()> {
    match cascade.state() {
        CascadeState::Complete => {
            let resolved = cascade.resolved().context("complete cascade without values")?;
            println!("선택 완료");
            println!("{}", serde_json::to_string_pretty(&resolved)?);
        }
        CascadeState::Resolving(AddressLevel::Lot) if cascade.is_dead_end() => {
            println!("No lot records exist under this selection");
        }
        CascadeState::Resolving(level) => println!("Next: {} ({})", level.label(), level),
        CascadeState::Start => println!("Next: {}", AddressLevel::Province.label()),
    }
    Ok(())
}

async fn interactive(resolver: &AddressResolver, cascade: &mut Cascade) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        if let Err(e) = cascade.refresh(resolver).await {
            eprintln!("조회 실패: {}", e);
        }

        let Some(level) = cascade.selection().first_unresolved() else {
            report(cascade)?;
            return Ok(());
        };

        match (cascade.options(level), cascade.error(level)) {
            (_, Some(error)) => println!("{}: {}", level.label(), error),
            (Some(options), None) if options.is_empty() => {
                println!("No lot records exist under this selection")
            }
            (Some(options), None) => print_options(level, options.iter()),
            (None, None) => {}
        }

        stdout
            .write_all(
                format!("{} [number, b=back, r=reset, q=quit]> ", level.placeholder()).as_bytes(),
            )
            .await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            return Ok(());
        };

        match line.trim() {
            "q" => return Ok(()),
            "r" => {
                cascade.reset();
                info!("Selection reset");
            }
            "b" => {
                if let Some(deepest) = cascade.selection().deepest() {
                    cascade.clear(deepest);
                }
            }
            input => {
                if let Err(e) = choose(cascade, level, input) {
                    eprintln!("{}", e);
                    continue;
                }
            }
        }

        let dropped = resolver.invalidate_outside(cascade.selection()).await;
        debug!("Dropped {} cached option lists", dropped);
    }
}

/// Select the option numbered `input` (1-based) at `level`
fn choose(cascade: &mut Cascade, level: AddressLevel, input: &str) -> Result<()> {
    let index: usize = input
        .parse()
        .with_context(|| format!("not a number: {}", input))?;
    let value = cascade
        .options(level)
        .and_then(|options| index.checked_sub(1).and_then(|i| options.get(i)))
        .map(str::to_string);

    match value {
        Some(value) => {
            cascade.select(level, &value)?;
            Ok(())
        }
        None => bail!("no option {} for {}", index, level.label()),
    }
}

fn print_options<'a>(level: AddressLevel, options: impl Iterator<Item = &'a str>) {
    println!("{}:", level.label());
    for (i, option) in options.enumerate() {
        println!("  {:>3}. {}", i + 1, option);
    }
}
