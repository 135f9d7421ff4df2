//! End-to-end walk through the client against a live cluster.
//!
//! Demonstrates:
//! - Wallet creation, balance and account info
//! - Airdrop, transfer and confirmation
//! - Program account creation and a raw program instruction
//! - Token mint, token account and minting
//! - Account subscriptions
//!
//! Usage:
//!   cargo run --example solana_integration
//!   RPC_URL=http://127.0.0.1:8899 cargo run --example solana_integration
//!   cargo run --example solana_integration -- --debug

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use solana_rpc_core::client::instruction::SYSTEM_PROGRAM_ID;
use solana_rpc_core::{
    AccountMeta, Client, Cluster, Commitment, Keypair, Signer, SubscriptionEvent,
};
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let debug = std::env::args().any(|arg| arg == "--debug");
    init_logging(debug);

    if let Err(e) = run().await {
        eprintln!("\n[ERROR] {e:#}");
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        "solana_rpc_core=debug"
    } else {
        "solana_rpc_core=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();
}

async fn run() -> Result<()> {
    let client = match std::env::var("RPC_URL") {
        Ok(url) => Client::builder().url(url),
        Err(_) => Client::builder().cluster(Cluster::Devnet),
    }
    .build()
    .context("building client")?;

    println!("=== Solana Integration ===");
    println!("    Endpoint: {}\n", client.config().endpoint.http_url());

    let payer = accounts(&client).await?;
    transactions(&client, &payer).await?;
    programs(&client, &payer).await?;
    tokens(&client, &payer).await?;
    subscriptions(&client, &payer).await?;

    println!("\n[Metrics]");
    println!("{}", serde_json::to_string_pretty(&client.get_metrics())?);

    client.shutdown();
    println!("\n=== Done ===");
    Ok(())
}

// ============================================================================
// Accounts
// ============================================================================

async fn accounts(client: &Client) -> Result<Keypair> {
    println!("[1] Account management");

    let wallet = client.create_wallet();
    println!("    Wallet:  {}", wallet.pubkey());

    let airdrop = client
        .request_airdrop(&wallet.pubkey(), 2 * LAMPORTS_PER_SOL)
        .await
        .context("airdrop")?;
    client
        .confirm_transaction(&airdrop, Commitment::Confirmed)
        .await
        .context("confirming airdrop")?;

    let balance = client.get_balance(&wallet.pubkey()).await?;
    println!("    Balance: {balance} lamports");

    if let Some(info) = client.get_account_info(&wallet.pubkey()).await? {
        println!("    Owner:   {}", info.owner);
    }
    println!("    ✓ Funded\n");
    Ok(wallet)
}

// ============================================================================
// Transactions
// ============================================================================

async fn transactions(client: &Client, payer: &Keypair) -> Result<()> {
    println!("[2] Transfer");

    let recipient = client.create_wallet();
    let signature = client
        .send_transaction(payer, &recipient.pubkey(), LAMPORTS_PER_SOL / 2)
        .await?;
    println!("    Sent:    {signature}");

    let status = client.get_transaction_status(&signature).await?;
    println!("    Status:  {}", status.state);

    let record = client
        .confirm_transaction(&signature, Commitment::Finalized)
        .await?;
    println!("    Final:   {} after {:?}\n", record.state, record.first_seen.elapsed());
    Ok(())
}

// ============================================================================
// Programs
// ============================================================================

async fn programs(client: &Client, payer: &Keypair) -> Result<()> {
    println!("[3] Program interaction");

    let (account, signature) = client
        .create_program_account(payer, &SYSTEM_PROGRAM_ID, 0)
        .await?;
    client
        .confirm_transaction(&signature, Commitment::Confirmed)
        .await?;
    println!("    Account: {}", account.pubkey());

    // System transfer of 1 lamport, built by hand
    let mut data = 2u32.to_le_bytes().to_vec();
    data.extend_from_slice(&1u64.to_le_bytes());
    let signature = client
        .send_program_instruction(
            payer,
            &SYSTEM_PROGRAM_ID,
            vec![
                AccountMeta::new(payer.pubkey(), true),
                AccountMeta::new(account.pubkey(), false),
            ],
            data,
        )
        .await?;
    println!("    Sent:    {signature}\n");
    Ok(())
}

// ============================================================================
// Tokens
// ============================================================================

async fn tokens(client: &Client, payer: &Keypair) -> Result<()> {
    println!("[4] Token operations");

    let (mint, signature) = client.create_token_mint(payer, 6).await?;
    client
        .confirm_transaction(&signature, Commitment::Confirmed)
        .await?;
    println!("    Mint:    {}", mint.pubkey());

    let (account, signature) = client
        .create_token_account(payer, &mint.pubkey(), &payer.pubkey())
        .await?;
    client
        .confirm_transaction(&signature, Commitment::Confirmed)
        .await?;
    println!("    Account: {}", account.pubkey());

    let signature = client
        .mint_tokens(payer, &mint.pubkey(), &account.pubkey(), 1_000_000)
        .await?;
    println!("    Minted:  {signature}\n");
    Ok(())
}

// ============================================================================
// Subscriptions
// ============================================================================

async fn subscriptions(client: &Client, payer: &Keypair) -> Result<()> {
    println!("[5] Subscriptions");

    let subscription = client.subscribe_to_account_changes(&payer.pubkey()).await?;
    println!("    Subscribed: {}", subscription.id());

    let recipient = client.create_wallet();
    client
        .send_transaction(payer, &recipient.pubkey(), 10_000)
        .await?;

    match timeout(Duration::from_secs(30), subscription.next()).await {
        Ok(Some(SubscriptionEvent::Notification(notification))) => {
            println!("    Change at slot {}", notification.slot);
        }
        Ok(other) => println!("    Stream ended: {other:?}"),
        Err(_) => println!("    No change within 30s"),
    }

    let outcome = client.unsubscribe(&subscription).await?;
    println!("    Unsubscribed: {outcome:?}");
    Ok(())
}
