use alloy::{
    primitives::utils::{format_ether, parse_ether},
    providers::{Provider, ProviderBuilder},
};
use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use guestbook::{
    error::{SignError, friendly_error_message},
    models::GuestbookEntry,
    services::{
        GuestbookFeed, GuestbookSource, GuestbookWriter, MessageDraft, RpcGuestbookSource, SubmittedTx,
        ens::EnsResolver,
    },
    utils::{
        config::Config,
        display::{format_timestamp, opensea_url, short_address, tx_url},
        init_logging,
    },
};

#[derive(Parser)]
#[command(name = "guestbook", about = "Read and sign the onchain guestbook")]
struct Cli {
    /// Network name or chain id, overrides GUESTBOOK_CHAIN
    #[arg(long, global = true, env = "GUESTBOOK_CHAIN")]
    chain: Option<String>,

    /// Resolve ENS names for guests (mainnet lookups)
    #[arg(long, global = true)]
    ens: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List entries, sponsored entry first
    List {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Show the most recent entry
    Latest,
    /// Validate a message and show the fees it would pay
    Quote {
        message: String,
        #[arg(long)]
        mint: bool,
    },
    /// Sign the guestbook (needs PRIVATE_KEY_SIGNER)
    Sign {
        message: String,
        #[arg(long)]
        mint: bool,
    },
    /// Post a sponsored message, pinned until the next sponsorship (needs PRIVATE_KEY_SIGNER)
    Sponsor {
        message: String,
        /// Price in ETH; defaults to the current minimum
        #[arg(long)]
        bid: Option<String>,
    },
    /// Send the fixed 0.05 ETH donation on mainnet (needs PRIVATE_KEY_SIGNER)
    Donate {
        #[arg(long)]
        yes: bool,
    },
    /// Chain head, scan progress and contract state
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let config = with_chain_override(Config::from_env()?, cli.chain.as_deref())?;

    let provider = ProviderBuilder::new().connect_http(config.rpc_url.parse()?);
    let source = RpcGuestbookSource::new(provider, config.contract_address);
    let names = if cli.ens {
        let mainnet = ProviderBuilder::new().connect_http(config.mainnet_rpc_url.parse()?);
        Some(EnsResolver::new(mainnet))
    } else {
        None
    };

    match cli.command {
        Commands::List { limit } => {
            let feed = load_feed(&config, &source).await?;
            let view = feed.view().await;
            if let Some(pinned) = &view.pinned {
                println!(
                    "📌 sponsored by {} for {} ETH",
                    short_address(&pinned.sponsorship.sponsor),
                    format_ether(pinned.sponsorship.amount)
                );
                print_entry(&config, &pinned.entry, &display_name(&names, &pinned.entry).await);
            }
            if view.entries.is_empty() && view.pinned.is_none() {
                println!("No signatures yet. Be the first to sign!");
            }
            for entry in view.entries.iter().take(limit) {
                print_entry(&config, entry, &display_name(&names, entry).await);
            }
        }
        Commands::Latest => {
            let feed = load_feed(&config, &source).await?;
            match feed.latest_entry().await {
                Some(entry) => print_entry(&config, &entry, &display_name(&names, &entry).await),
                None => println!("No signatures yet. Be the first to sign!"),
            }
        }
        Commands::Quote { message, mint } => {
            let draft = compose(&message, mint)?;
            let quote = draft.quote();
            println!("message:     {}", draft.text());
            println!("message fee: {} ETH", format_ether(quote.message_fee));
            println!("mint fee:    {} ETH", format_ether(quote.mint_fee));
            println!("total:       {} ETH (plus gas)", format_ether(quote.total));
            println!("sent with tx: {} ETH", format_ether(quote.value));
        }
        Commands::Sign { message, mint } => {
            let draft = compose(&message, mint)?;
            let writer = writer(&config)?;
            let paused = source.is_paused().await?;
            let submitted = writer.sign(&draft, paused).await.map_err(user_error)?;
            print_submitted(&config, &submitted);
            if let Some(entry) = &submitted.entry {
                println!("Signed as guest #{}", entry.guest_id);
                if let Some(url) = opensea_url(&config.chain, &config.contract_address, entry) {
                    println!("NFT: {}", url);
                }
            }
        }
        Commands::Sponsor { message, bid } => {
            let draft = compose(&message, false)?;
            let feed = load_feed(&config, &source).await?;
            let required = feed.required_bid(Utc::now().timestamp().max(0) as u64).await;
            let bid = match bid {
                Some(eth) => parse_ether(&eth).map_err(|e| anyhow::anyhow!("Invalid bid '{}': {}", eth, e))?,
                None => required,
            };
            let writer = writer(&config)?;
            let paused = feed.is_paused().await.unwrap_or(false);
            let submitted = writer.sponsor(&draft, bid, required, paused).await.map_err(user_error)?;
            print_submitted(&config, &submitted);
        }
        Commands::Donate { yes } => {
            if !yes {
                anyhow::bail!("Donating sends real ETH on mainnet; pass --yes to confirm");
            }
            let writer = writer(&config)?;
            let submitted = writer.donate(&config.mainnet_rpc_url).await?;
            println!("Thank you! Donation tx: {}", submitted.transaction_hash);
        }
        Commands::Status => {
            let feed = load_feed(&config, &source).await?;
            let status = feed.status().await;
            let required = feed.required_bid(Utc::now().timestamp().max(0) as u64).await;
            println!("chain:          {} ({})", config.chain.name, config.chain.chain_id);
            println!("contract:       {}", config.contract_address);
            println!("chain head:     {}", source.latest_block().await?);
            println!("scanned to:     {:?}", status.scanned_to);
            println!("entries:        {}", status.total_entries);
            println!("guest count:    {}", status.guest_count.map(|c| c.to_string()).unwrap_or_else(|| "?".into()));
            println!("paused:         {}", status.paused.map(|p| p.to_string()).unwrap_or_else(|| "?".into()));
            println!("sponsor price:  {} ETH", format_ether(required));
        }
    }

    Ok(())
}

/// Applies `--chain`. The RPC URL is only swapped when the chain really changes.
fn with_chain_override(config: Config, chain: Option<&str>) -> Result<Config> {
    let Some(chain) = chain else {
        return Ok(config);
    };
    let profile = *guestbook::chains::find(chain).ok_or_else(|| anyhow::anyhow!("Unknown chain '{}'", chain))?;
    if profile.chain_id == config.chain.chain_id {
        return Ok(config);
    }
    Ok(Config {
        rpc_url: profile.default_rpc.to_string(),
        chain: profile,
        ..config
    })
}

async fn load_feed<S: GuestbookSource>(config: &Config, source: &S) -> Result<GuestbookFeed> {
    let feed = GuestbookFeed::new(config.start_block);
    let update = feed.refresh(source).await?;
    tracing::debug!("Loaded {} entries up to block {:?}", update.total_entries, update.scanned_to);
    Ok(feed)
}

fn compose(message: &str, mint: bool) -> Result<MessageDraft> {
    MessageDraft::compose(message, mint).map_err(user_error)
}

fn writer(config: &Config) -> Result<GuestbookWriter> {
    GuestbookWriter::new(config.rpc_url.clone(), config.contract_address, config.require_signer()?)
}

fn user_error(err: SignError) -> anyhow::Error {
    tracing::debug!("Raw error: {:?}", err);
    match err {
        SignError::Fetch(_) | SignError::Other(_) => anyhow::anyhow!(friendly_error_message(&err.to_string())),
        refused => anyhow::anyhow!(refused.to_string()),
    }
}

async fn display_name<P: Provider + Clone>(names: &Option<EnsResolver<P>>, entry: &GuestbookEntry) -> String {
    match names {
        Some(names) => names.display_name(entry.guest).await,
        None => short_address(&entry.guest),
    }
}

fn print_entry(config: &Config, entry: &GuestbookEntry, name: &str) {
    let minted = if entry.is_minted() { format!(" 🖼 #{}", entry.token_id) } else { String::new() };
    println!(
        "#{:<5} {:<24} {}  {}{}",
        entry.guest_id.to_string(),
        name,
        format_timestamp(entry.timestamp),
        entry.display_message(),
        minted
    );
    println!("       {}", tx_url(&config.chain, &entry.transaction_hash));
}

fn print_submitted(config: &Config, submitted: &SubmittedTx) {
    println!("tx: {}", tx_url(&config.chain, &submitted.transaction_hash));
    match submitted.confirmed {
        Some(true) => println!("confirmed in block {:?}", submitted.block_number),
        Some(false) => println!("transaction reverted"),
        None => println!("not confirmed yet, check the explorer"),
    }
}
