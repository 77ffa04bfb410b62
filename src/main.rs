//! Confidential perpetuals settlement simulation.
//!
//! Runs one position through the whole reveal-driven lifecycle: request,
//! validation, entry-range check, fill, a day of funding, close and payout.
//! Set `RUST_LOG=confidential_perps=debug` to watch every transition.

use confidential_perps::*;
use rust_decimal_macros::dec;
use std::error::Error;
use tracing::info;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::FmtSubscriber;

const DAY_MS: i64 = 86_400_000;

fn main() -> Result<(), Box<dyn Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    println!("Confidential Perpetuals Settlement Simulation");
    println!("Reveal-gated lifecycle, skew funding, quadratic impact\n");

    scenario_long_through_a_day_of_funding()?;
    scenario_rejected_request()?;

    println!("\nAll simulations completed successfully.");
    Ok(())
}

/// 3x long held for a day of max-rate funding while the price rises 5%.
fn scenario_long_through_a_day_of_funding() -> Result<(), Box<dyn Error>> {
    println!("Scenario 1: Long through a day of funding\n");

    let mut ex = SimExchange::simulated(ExchangeConfig::default(), dec!(2000))?;
    let lp = TraderId(1);
    let trader = TraderId(2);

    ex.assets_mut().fund(lp, Quote::new(dec!(1_000_000)));
    ex.assets_mut().fund(trader, Quote::new(dec!(10_000)));
    ex.provide_liquidity(lp, Quote::new(dec!(1_000_000)))?;
    println!("  LP deposits 1,000,000, pool liquidity {}", ex.pool_liquidity());

    let order = ex.encrypt_order(Side::Long, dec!(30_000), dec!(1_990), dec!(2_010));
    let id = ex.request_open(trader, order.direction, order.size, order.range, Quote::new(dec!(10_000)))?;
    println!("  Trader requests {} : 30,000 long, 10,000 collateral, band 1990..2010", id);

    for round in 1..=4 {
        let report = ex.deliver_and_sweep()?;
        println!("  Sweep {}: {:?}", round, report.get(id));
        if ex.get_position(id).map(|p| p.status) == Some(PositionStatus::Open) {
            break;
        }
    }

    let rate = ex.compute().peek_signed(ex.funding_rate());
    println!("  Filled. funding rate {} per second (1e12 scale), longs pay\n", rate);

    ex.advance_time(DAY_MS);
    ex.oracle_mut().set_price(dec!(2100));
    println!("  One day passes, price moves to 2100");

    ex.request_close(trader, id)?;
    println!("  Close requested, queued behind the in-flight liquidation check");

    for _ in 0..4 {
        let report = ex.deliver_and_sweep()?;
        if let Some(transition) = report.get(id) {
            println!("  Sweep: {:?}", transition);
        }
        if ex.get_position(id).map(|p| p.status.is_terminal()) == Some(true) {
            break;
        }
    }

    let position = ex.get_position(id).ok_or(EngineError::PositionNotFound(id))?;
    let payout = position.payout.unwrap_or_else(Quote::zero);
    // collateral plus price PnL only: 10000 + 30000 * 100 / 2000
    let baseline = Quote::new(dec!(11_500));

    println!("\n  Status:            {}", position.status);
    println!("  Payout:            {}", payout);
    println!("  PnL-only baseline: {}", baseline);
    println!("  Funding and fees cost the long {}", baseline.sub(payout));
    println!(
        "  Trader wallet {}, pool {}, LP fees {}",
        ex.assets().balance(LedgerAccount::Trader(trader)),
        ex.pool_liquidity(),
        ex.vault().fees_collected()
    );

    info!(position_id = %id, payout = %payout, baseline = %baseline, "Scenario 1 complete");
    Ok(())
}

/// Over-leveraged request: validated confidentially, revealed false, refunded.
fn scenario_rejected_request() -> Result<(), Box<dyn Error>> {
    println!("\nScenario 2: Over-leveraged request is refunded\n");

    let mut ex = SimExchange::simulated(ExchangeConfig::default(), dec!(2000))?;
    let trader = TraderId(7);
    ex.assets_mut().fund(trader, Quote::new(dec!(1_000)));

    // 50x against a 10x cap
    let order = ex.encrypt_order(Side::Short, dec!(50_000), dec!(1_900), dec!(2_100));
    let id = ex.request_open(trader, order.direction, order.size, order.range, Quote::new(dec!(1_000)))?;
    println!(
        "  Request {} escrowed, wallet {}",
        id,
        ex.assets().balance(LedgerAccount::Trader(trader))
    );

    let report = ex.deliver_and_sweep()?;
    println!("  Sweep: {:?}", report.get(id));
    println!(
        "  Removed: {}, wallet {}",
        ex.get_position(id).map(|p| p.is_removed()).unwrap_or(false),
        ex.assets().balance(LedgerAccount::Trader(trader))
    );
    Ok(())
}
