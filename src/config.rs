// 7.0 config.rs: all settings in one place. market limits, funding, impact, margin, fees.
// 7.1 FeeConfig is a flat rate per close cause. no maker/taker split, there is no book.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::funding::FundingParams;
use crate::impact::ImpactParams;
use crate::margin::MarginParams;
use crate::types::{Bps, Leverage, Quote};

// Plaintext bounds every request is checked against, confidentially
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketParams {
    // Minimum notional per position
    pub min_size: Quote,
    // Maximum notional per position
    pub max_size: Quote,
    // notional <= collateral * max_leverage
    pub max_leverage: Leverage,
    // Cap on open interest per side after the fill
    pub max_oi_per_side: Quote,
}

impl Default for MarketParams {
    fn default() -> Self {
        Self {
            min_size: Quote::new(dec!(10)),
            max_size: Quote::new(dec!(1_000_000)),
            max_leverage: Leverage::new_unchecked(dec!(10)),
            max_oi_per_side: Quote::new(dec!(10_000_000)),
        }
    }
}

/** 7.2: fee settings in bps, charged on gross payout. 100 bps = 1% */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    pub close_fee_bps: Bps,
    pub liquidation_fee_bps: Bps,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            close_fee_bps: Bps::new(10),       // 0.1%
            liquidation_fee_bps: Bps::new(50), // 0.5%
        }
    }
}

// Lifecycle knobs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LifecycleParams {
    // Failed entry-range checks before the request is refunded. None retries forever.
    pub max_range_checks: Option<u32>,
}

// The complete exchange configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub market: MarketParams,
    pub funding: FundingParams,
    pub impact: ImpactParams,
    pub margin: MarginParams,
    pub fees: FeeConfig,
    pub lifecycle: LifecycleParams,
}

impl ExchangeConfig {
    // Create a configuration preset for testnet
    pub fn testnet() -> Self {
        let mut config = Self::default();
        config.market.max_leverage = Leverage::new_unchecked(dec!(20)); // 20x max
        config.margin.maintenance_margin_rate = dec!(0.025); // 2.5%
        config.fees.close_fee_bps = Bps::new(0); // free closes on testnet
        config
    }

    // Create a configuration preset for mainnet with conservative settings
    pub fn mainnet_conservative() -> Self {
        let mut config = Self::default();
        config.market.max_leverage = Leverage::new_unchecked(dec!(5)); // 5x max
        config.market.max_oi_per_side = Quote::new(dec!(5_000_000));
        config.margin.maintenance_margin_rate = dec!(0.1); // 10%
        config.fees.liquidation_fee_bps = Bps::new(100);
        config.impact.min_liquidity = Quote::new(dec!(250_000));
        config.lifecycle.max_range_checks = Some(20);
        config
    }

    // Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mmr = self.margin.maintenance_margin_rate;
        if mmr <= Decimal::ZERO || mmr >= Decimal::ONE {
            return Err(ConfigError::InvalidMargin {
                reason: "maintenance margin rate must be between 0 and 1".to_string(),
            });
        }
        // at max leverage the requirement must sit below the posted collateral
        if mmr * self.market.max_leverage.value() >= Decimal::ONE {
            return Err(ConfigError::InvalidMargin {
                reason: "maintenance margin at max leverage exceeds collateral".to_string(),
            });
        }

        if self.market.min_size.value() <= Decimal::ZERO {
            return Err(ConfigError::InvalidMarket {
                reason: "min size must be positive".to_string(),
            });
        }
        if self.market.min_size >= self.market.max_size {
            return Err(ConfigError::InvalidMarket {
                reason: "min size must be less than max".to_string(),
            });
        }
        if self.market.max_oi_per_side < self.market.max_size {
            return Err(ConfigError::InvalidMarket {
                reason: "OI cap below a single max-size position".to_string(),
            });
        }

        if self.funding.max_daily_rate <= Decimal::ZERO || self.funding.max_daily_rate >= Decimal::ONE {
            return Err(ConfigError::InvalidFunding {
                reason: "max daily rate must be between 0 and 1".to_string(),
            });
        }
        if self.funding.max_rate_per_second() == 0 {
            return Err(ConfigError::InvalidFunding {
                reason: "max daily rate rounds to zero per second".to_string(),
            });
        }
        if self.funding.skew_scale.value() <= Decimal::ZERO {
            return Err(ConfigError::InvalidFunding {
                reason: "skew scale must be positive".to_string(),
            });
        }

        if self.impact.gamma < Decimal::ZERO
            || self.impact.beta < Decimal::ZERO
            || self.impact.liquidity_factor < Decimal::ZERO
        {
            return Err(ConfigError::InvalidImpact {
                reason: "gamma, beta and liquidity factor must be non-negative".to_string(),
            });
        }
        if self.impact.min_liquidity.value() <= Decimal::ZERO {
            return Err(ConfigError::InvalidImpact {
                reason: "min liquidity must be positive".to_string(),
            });
        }

        if self.fees.close_fee_bps.value() > 100 {
            return Err(ConfigError::InvalidFees {
                reason: "close fee too high (>1%)".to_string(),
            });
        }
        if self.fees.liquidation_fee_bps.value() > 1_000 {
            return Err(ConfigError::InvalidFees {
                reason: "liquidation fee too high (>10%)".to_string(),
            });
        }

        if self.lifecycle.max_range_checks == Some(0) {
            return Err(ConfigError::InvalidLifecycle {
                reason: "max range checks must allow at least one check".to_string(),
            });
        }

        Ok(())
    }

    pub fn max_leverage(&self) -> Decimal {
        self.market.max_leverage.value()
    }
}

// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid margin config: {reason}")]
    InvalidMargin { reason: String },
    #[error("Invalid market config: {reason}")]
    InvalidMarket { reason: String },
    #[error("Invalid funding config: {reason}")]
    InvalidFunding { reason: String },
    #[error("Invalid impact config: {reason}")]
    InvalidImpact { reason: String },
    #[error("Invalid fee config: {reason}")]
    InvalidFees { reason: String },
    #[error("Invalid lifecycle config: {reason}")]
    InvalidLifecycle { reason: String },
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Testnet,
    Mainnet,
}

impl Environment {
    pub fn config(&self) -> ExchangeConfig {
        match self {
            Environment::Development => ExchangeConfig::default(),
            Environment::Testnet => ExchangeConfig::testnet(),
            Environment::Mainnet => ExchangeConfig::mainnet_conservative(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = ExchangeConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_testnet_config_valid() {
        let config = ExchangeConfig::testnet();
        assert!(config.validate().is_ok());
        assert_eq!(config.fees.close_fee_bps.value(), 0);
        assert_eq!(config.max_leverage(), dec!(20));
    }

    #[test]
    fn test_mainnet_config_valid() {
        let config = ExchangeConfig::mainnet_conservative();
        assert!(config.validate().is_ok());
        assert_eq!(config.lifecycle.max_range_checks, Some(20));
    }

    #[test]
    fn test_invalid_margin() {
        let mut config = ExchangeConfig::default();
        config.margin.maintenance_margin_rate = dec!(1.1);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidMargin { .. })));

        // 10% at 10x leaves nothing
        config.margin.maintenance_margin_rate = dec!(0.1);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidMargin { .. })));
    }

    #[test]
    fn test_invalid_market() {
        let mut config = ExchangeConfig::default();
        config.market.min_size = Quote::new(dec!(100));
        config.market.max_size = Quote::new(dec!(10));
        assert!(matches!(config.validate(), Err(ConfigError::InvalidMarket { .. })));
    }

    #[test]
    fn test_invalid_funding_and_lifecycle() {
        let mut config = ExchangeConfig::default();
        config.funding.max_daily_rate = dec!(0.00000000001);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidFunding { .. })));

        let mut config = ExchangeConfig::default();
        config.lifecycle.max_range_checks = Some(0);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidLifecycle { .. })));
    }

    #[test]
    fn test_environment_presets() {
        assert!(Environment::Development.config().validate().is_ok());
        assert!(Environment::Testnet.config().validate().is_ok());
        assert!(Environment::Mainnet.config().validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = ExchangeConfig::mainnet_conservative();
        let json = serde_json::to_string(&config).unwrap();
        let back: ExchangeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.market.max_leverage, config.market.max_leverage);
        assert_eq!(back.lifecycle.max_range_checks, Some(20));
    }
}
