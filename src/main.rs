use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use tradedesk::audit::TracingAuditSink;
use tradedesk::backend::{Credentials, ExecutionBackend};
use tradedesk::core::{AccountId, Config, OrderIntent, Side, VenueTag};
use tradedesk::price::StaticPriceSource;
use tradedesk::router::OrderRouter;

/// Paper smoke session: wires a paper account through the full routing
/// pipeline and logs the resulting ledger and risk state.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tradedesk=debug"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let config = match std::env::var("TRADEDESK_CONFIG") {
        Ok(path) => Config::load(&path)?,
        Err(_) => Config::default(),
    };

    tracing::info!(
        starting_capital = %config.paper.starting_capital,
        "tradedesk starting paper smoke session"
    );

    let prices = Arc::new(StaticPriceSource::new());
    prices.set("RELIANCE", dec!(2500));
    prices.set("TCS", dec!(3200));

    let router = OrderRouter::new(Arc::new(TracingAuditSink), prices, &config);
    let account = AccountId::new("paper-demo");
    let paper = router.register_paper_account(account.clone(), &config);
    paper.connect(&Credentials::default()).await?;

    let buy = OrderIntent::limit(
        "RELIANCE",
        VenueTag::Nse,
        Side::Buy,
        5,
        dec!(2500),
        "demo-buy-1",
    );
    let response = router.submit(&account, &buy).await;
    tracing::info!(?response, "buy routed");

    let sell = OrderIntent::limit(
        "RELIANCE",
        VenueTag::Nse,
        Side::Sell,
        5,
        dec!(2700),
        "demo-sell-1",
    );
    let response = router.submit(&account, &sell).await;
    tracing::info!(?response, "sell routed");

    // An oversized order exercises the risk gate end to end.
    let oversized = OrderIntent::limit(
        "TCS",
        VenueTag::Nse,
        Side::Buy,
        50,
        dec!(3200),
        "demo-big-1",
    );
    let response = router.submit(&account, &oversized).await;
    tracing::info!(?response, "oversized order");

    let summary = router.paper_summary(&account)?;
    tracing::info!(
        capital = %summary.current_capital,
        realized = %summary.realized_pnl,
        trades = summary.total_trades,
        "session summary"
    );

    let status = router.get_risk_status(&account)?;
    tracing::info!(halted = status.halted, daily_pnl = %status.daily_pnl, "risk status");

    Ok(())
}
