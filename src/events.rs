// 12.0: every lifecycle transition produces an event. used for audit trails and notifying
// keepers. payloads carry only plaintext: ids, prices, collateral and payouts. direction and
// size never appear here.

use crate::position::CloseCause;
use crate::types::{PositionId, Price, Quote, Timestamp, TraderId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }

    pub fn position_id(&self) -> Option<PositionId> {
        match &self.payload {
            EventPayload::PositionRequested(e) => Some(e.position_id),
            EventPayload::RequestAccepted { position_id } => Some(*position_id),
            EventPayload::RequestRejected(e) => Some(e.position_id),
            EventPayload::RequestExpired(e) => Some(e.position_id),
            EventPayload::RangeCheckIssued(e) => Some(e.position_id),
            EventPayload::PositionFilled(e) => Some(e.position_id),
            EventPayload::LiquidationCheckIssued(e) => Some(e.position_id),
            EventPayload::CloseRequested(e) => Some(e.position_id),
            EventPayload::SettlementStarted(e) => Some(e.position_id),
            EventPayload::PositionSettled(e) => Some(e.position_id),
            EventPayload::LiquidityDeposited(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // Request events
    PositionRequested(PositionRequestedEvent),
    RequestAccepted { position_id: PositionId },
    RequestRejected(RefundEvent),
    RequestExpired(RefundEvent),

    // Fill events
    RangeCheckIssued(RangeCheckEvent),
    PositionFilled(PositionFilledEvent),

    // Risk events
    LiquidationCheckIssued(LiquidationCheckEvent),

    // Settlement events
    CloseRequested(CloseRequestedEvent),
    SettlementStarted(SettlementStartedEvent),
    PositionSettled(PositionSettledEvent),

    // Pool events
    LiquidityDeposited(LiquidityDepositedEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionRequestedEvent {
    pub position_id: PositionId,
    pub owner: TraderId,
    pub collateral: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundEvent {
    pub position_id: PositionId,
    pub owner: TraderId,
    pub refund: Quote,
    pub range_checks: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeCheckEvent {
    pub position_id: PositionId,
    pub price: Price,
    pub attempt: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionFilledEvent {
    pub position_id: PositionId,
    pub owner: TraderId,
    pub fill_price: Price,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationCheckEvent {
    pub position_id: PositionId,
    pub mark_price: Price,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseRequestedEvent {
    pub position_id: PositionId,
    pub owner: TraderId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementStartedEvent {
    pub position_id: PositionId,
    pub price: Price,
    pub cause: CloseCause,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSettledEvent {
    pub position_id: PositionId,
    pub owner: TraderId,
    pub cause: CloseCause,
    pub collateral: Quote,
    pub gross_payout: Quote,
    pub fee: Quote,
    pub net_payout: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityDepositedEvent {
    pub provider: TraderId,
    pub amount: Quote,
    pub pool_liquidity: Quote,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn events_point_at_their_position() {
        let settled = Event::new(
            EventId(4),
            Timestamp::from_millis(1000),
            EventPayload::PositionSettled(PositionSettledEvent {
                position_id: PositionId(2),
                owner: TraderId(1),
                cause: CloseCause::Liquidation,
                collateral: Quote::new(dec!(1000)),
                gross_payout: Quote::new(dec!(200)),
                fee: Quote::new(dec!(1)),
                net_payout: Quote::new(dec!(199)),
            }),
        );
        assert_eq!(settled.position_id(), Some(PositionId(2)));

        let deposit = Event::new(
            EventId(5),
            Timestamp::from_millis(1000),
            EventPayload::LiquidityDeposited(LiquidityDepositedEvent {
                provider: TraderId(9),
                amount: Quote::new(dec!(1_000_000)),
                pool_liquidity: Quote::new(dec!(1_000_000)),
            }),
        );
        assert_eq!(deposit.position_id(), None);
    }

    #[test]
    fn payload_serializes() {
        let event = Event::new(
            EventId(1),
            Timestamp::from_millis(0),
            EventPayload::RequestAccepted {
                position_id: PositionId(1),
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("RequestAccepted"));
    }
}
