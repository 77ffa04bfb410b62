//! Solvency invariant tests.
//!
//! Open interest, escrow and pool balances must stay consistent through any
//! interleaving of requests, fills, closes and liquidations, and a sweep
//! that cannot pay must leave everything exactly as it found it.

use confidential_perps::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const LP: TraderId = TraderId(1);

fn q(value: Decimal) -> Quote {
    Quote::new(value)
}

fn exchange(pool: Decimal) -> SimExchange {
    let mut ex = SimExchange::simulated(ExchangeConfig::default(), dec!(2000)).unwrap();
    ex.assets_mut().fund(LP, q(dec!(100_000_000)));
    ex.provide_liquidity(LP, q(pool)).unwrap();
    ex
}

fn open(ex: &mut SimExchange, trader: TraderId, side: Side, size: Decimal, collateral: Decimal) -> PositionId {
    let order = ex.encrypt_order(side, size, dec!(1_000), dec!(3_000));
    ex.request_open(trader, order.direction, order.size, order.range, q(collateral))
        .unwrap()
}

/// Confidential OI, revealed for the test through the backend.
fn oi(ex: &SimExchange) -> (u128, u128) {
    let oi = ex.open_interest();
    (ex.compute().peek(oi.long), ex.compute().peek(oi.short))
}

/// Sum of plaintext sizes of Open / AwaitingSettlement positions per side.
fn expected_oi(ex: &SimExchange) -> (u128, u128) {
    ex.positions()
        .filter(|p| matches!(p.status, PositionStatus::Open | PositionStatus::AwaitingSettlement))
        .fold((0, 0), |(long, short), p| {
            let size = ex.compute().peek(p.size);
            if ex.compute().peek_bool(p.direction) {
                (long + size, short)
            } else {
                (long, short + size)
            }
        })
}

fn assert_books_agree(ex: &SimExchange, total_minted: Decimal, traders: &[TraderId]) {
    let escrow = ex.assets().balance(LedgerAccount::Escrow);
    let pool = ex.assets().balance(LedgerAccount::Pool);
    assert_eq!(escrow, ex.escrowed_collateral());
    assert_eq!(pool, ex.pool_liquidity());

    let wallets: Quote = traders
        .iter()
        .chain(std::iter::once(&LP))
        .map(|t| ex.assets().balance(LedgerAccount::Trader(*t)))
        .sum();
    assert_eq!(wallets.add(escrow).add(pool), q(total_minted));
}

fn settle_everything(ex: &mut SimExchange, rounds: usize) {
    for _ in 0..rounds {
        ex.deliver_and_sweep().unwrap();
        if ex.live_positions().is_empty() {
            return;
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// OI equals the notional of live filled positions at every step, and
    /// drains to zero once everything settles
    #[test]
    fn open_interest_tracks_live_notional(
        orders in proptest::collection::vec((any::<bool>(), 100u32..5_000u32), 1..8),
        moves in proptest::collection::vec(1_900u32..2_100u32, 1..4),
        close_mask in any::<u8>(),
    ) {
        let mut ex = exchange(dec!(10_000_000));
        let mut traders = Vec::new();
        let mut ids = Vec::new();
        for (i, (is_long, size)) in orders.iter().enumerate() {
            let trader = TraderId(10 + i as u64);
            ex.assets_mut().fund(trader, q(dec!(10_000)));
            traders.push(trader);
            let side = if *is_long { Side::Long } else { Side::Short };
            let size = Decimal::from(*size);
            ids.push(open(&mut ex, trader, side, size, size / dec!(2)));
        }
        let minted = dec!(100_000_000) + Decimal::from(traders.len() as u64) * dec!(10_000);

        // request -> pending -> open
        ex.deliver_and_sweep().unwrap();
        ex.deliver_and_sweep().unwrap();
        prop_assert_eq!(oi(&ex), expected_oi(&ex));
        assert_books_agree(&ex, minted, &traders);

        for (round, price) in moves.iter().enumerate() {
            ex.advance_time(3_600_000);
            ex.oracle_mut().set_price(Decimal::from(*price));
            for (i, id) in ids.iter().enumerate() {
                let wants_close = close_mask & (1 << (i % 8)) != 0 && round == 0;
                let is_open = ex.get_position(*id).map(|p| p.status == PositionStatus::Open && !p.close_requested);
                if wants_close && is_open == Some(true) {
                    ex.request_close(traders[i], *id).unwrap();
                }
            }
            ex.deliver_and_sweep().unwrap();
            prop_assert_eq!(oi(&ex), expected_oi(&ex));
            assert_books_agree(&ex, minted, &traders);
        }

        for (i, id) in ids.iter().enumerate() {
            let is_open = ex.get_position(*id).map(|p| p.status == PositionStatus::Open && !p.close_requested);
            if is_open == Some(true) {
                ex.request_close(traders[i], *id).unwrap();
            }
        }
        settle_everything(&mut ex, 6);

        prop_assert!(ex.live_positions().is_empty());
        prop_assert_eq!(oi(&ex), (0, 0));
        let reserved = ex.reserved_interest();
        prop_assert_eq!((ex.compute().peek(reserved.long), ex.compute().peek(reserved.short)), (0, 0));
        prop_assert_eq!(ex.compute().peek_signed(ex.funding_rate()), 0);
        prop_assert_eq!(ex.escrowed_collateral(), Quote::zero());
        assert_books_agree(&ex, minted, &traders);
    }
}

#[test]
fn rejected_requests_never_touch_open_interest() {
    let mut ex = exchange(dec!(1_000_000));
    let trader = TraderId(10);
    ex.assets_mut().fund(trader, q(dec!(10_000)));

    // 20x against the 10x cap
    let id = open(&mut ex, trader, Side::Long, dec!(20_000), dec!(1_000));
    ex.deliver_and_sweep().unwrap();

    assert!(ex.get_position(id).unwrap().is_removed());
    assert_eq!(oi(&ex), (0, 0));
    assert_books_agree(&ex, dec!(100_010_000), &[trader]);
}

#[test]
fn opposite_positions_net_the_skew() {
    let mut ex = exchange(dec!(1_000_000));
    let (alice, bob) = (TraderId(10), TraderId(11));
    ex.assets_mut().fund(alice, q(dec!(10_000)));
    ex.assets_mut().fund(bob, q(dec!(10_000)));

    open(&mut ex, alice, Side::Long, dec!(30_000), dec!(10_000));
    open(&mut ex, bob, Side::Short, dec!(30_000), dec!(10_000));
    ex.deliver_and_sweep().unwrap();
    ex.deliver_and_sweep().unwrap();

    assert_eq!(oi(&ex), (30_000 * SCALE, 30_000 * SCALE));
    // balanced book: no funding either way
    assert_eq!(ex.compute().peek(ex.funding_rate().magnitude), 0);
}

#[test]
fn insolvent_payout_aborts_the_whole_sweep() {
    // thin pool: 10k against two 3x longs that each win ~7.5k
    let mut ex = exchange(dec!(10_000));
    let (alice, bob) = (TraderId(10), TraderId(11));
    ex.assets_mut().fund(alice, q(dec!(10_000)));
    ex.assets_mut().fund(bob, q(dec!(10_000)));
    let first = open(&mut ex, alice, Side::Long, dec!(30_000), dec!(10_000));
    let second = open(&mut ex, bob, Side::Long, dec!(30_000), dec!(10_000));
    ex.deliver_and_sweep().unwrap();
    ex.deliver_and_sweep().unwrap();

    ex.oracle_mut().set_price(dec!(2500));
    ex.request_close(alice, first).unwrap();
    ex.request_close(bob, second).unwrap();
    ex.deliver_and_sweep().unwrap();
    assert_eq!(ex.get_position(first).unwrap().status, PositionStatus::AwaitingSettlement);
    assert_eq!(ex.get_position(second).unwrap().status, PositionStatus::AwaitingSettlement);

    let oi_before = oi(&ex);
    let events_before = ex.events().len();
    let batches_before = ex.assets().executed_batches().len();
    let traders = [alice, bob];
    let minted = dec!(100_020_000);

    // the first payout fits (10k pool + 10k collateral), the second does not
    ex.compute_mut().deliver_reveals();
    let err = ex.sweep(&[first, second]).unwrap_err();
    assert!(matches!(err, EngineError::PoolInsolvent { position_id, .. } if position_id == second));

    // nothing moved, including the first settlement
    for id in [first, second] {
        let position = ex.get_position(id).unwrap();
        assert_eq!(position.status, PositionStatus::AwaitingSettlement);
        assert!(position.latches.equity);
        assert!(position.payout.is_none());
    }
    assert_eq!(oi(&ex), oi_before);
    assert_eq!(ex.events().len(), events_before);
    assert_eq!(ex.assets().executed_batches().len(), batches_before);
    assert_eq!(ex.pool_liquidity(), q(dec!(10_000)));
    assert_eq!(ex.escrowed_collateral(), q(dec!(20_000)));
    assert_books_agree(&ex, minted, &traders);

    // fresh liquidity lets the same reveals settle
    ex.provide_liquidity(LP, q(dec!(100_000))).unwrap();
    let report = ex.sweep(&[first, second]).unwrap();
    assert!(matches!(report.get(first), Some(Transition::Settled { .. })));
    assert!(matches!(report.get(second), Some(Transition::Settled { .. })));
    assert_eq!(oi(&ex), (0, 0));
    assert_books_agree(&ex, minted, &traders);
}

#[test]
fn single_sweep_runs_one_batch() {
    let mut ex = exchange(dec!(1_000_000));
    let traders: Vec<TraderId> = (10..14).map(TraderId).collect();
    let mut ids = Vec::new();
    for (i, trader) in traders.iter().enumerate() {
        ex.assets_mut().fund(*trader, q(dec!(5_000)));
        let side = if i % 2 == 0 { Side::Long } else { Side::Short };
        ids.push(open(&mut ex, *trader, side, dec!(5_000), dec!(1_000)));
    }
    ex.deliver_and_sweep().unwrap();
    ex.deliver_and_sweep().unwrap();
    for (trader, id) in traders.iter().zip(&ids) {
        ex.request_close(*trader, *id).unwrap();
    }
    ex.deliver_and_sweep().unwrap();

    let batches_before = ex.assets().executed_batches().len();
    let report = ex.deliver_and_sweep().unwrap();
    assert_eq!(report.progressed(), 4);
    // four settlements, one ledger batch
    assert_eq!(ex.assets().executed_batches().len(), batches_before + 1);

    let pool = ex.vault();
    assert_eq!(pool.total_collateral_in(), q(dec!(4_000)));
    assert_eq!(
        ex.pool_liquidity(),
        q(dec!(1_000_000)).add(pool.total_collateral_in()).sub(pool.total_paid_out())
    );
    assert!(ex.vault().fees_collected() > Quote::zero());
    assert_books_agree(&ex, dec!(100_020_000), &traders);
}

#[test]
fn released_collateral_covers_a_payout_above_the_pool() {
    // 10k pool, one 3x long that wins ~7.5k: payout exceeds the pool alone
    let mut ex = exchange(dec!(10_000));
    let trader = TraderId(10);
    ex.assets_mut().fund(trader, q(dec!(10_000)));
    let id = open(&mut ex, trader, Side::Long, dec!(30_000), dec!(10_000));
    ex.deliver_and_sweep().unwrap();
    ex.deliver_and_sweep().unwrap();

    ex.oracle_mut().set_price(dec!(2500));
    ex.request_close(trader, id).unwrap();
    ex.deliver_and_sweep().unwrap();
    let report = ex.deliver_and_sweep().unwrap();

    let payout = match report.get(id) {
        Some(Transition::Settled { payout, .. }) => payout,
        other => panic!("expected settlement, got {:?}", other),
    };
    assert!(payout > q(dec!(10_000)));
    assert!(payout <= q(dec!(20_000)));
    assert_eq!(ex.pool_liquidity(), q(dec!(20_000)).sub(payout));
    assert_books_agree(&ex, dec!(100_010_000), &[trader]);
}
