//! Loyalty tiers and free-credit derivation from customer points.

use serde::Serialize;
use utoipa::ToSchema;

/// Points needed for the VIP tier.
pub const VIP_THRESHOLD: i32 = 20;

/// Points that earn one free credit.
pub const POINTS_PER_CREDIT: i32 = 5;

/// Customer tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoyaltyTier {
    /// Default tier.
    Normal,
    /// `points >= 20`.
    Vip,
}

impl LoyaltyTier {
    /// Tier earned with `points`.
    #[must_use]
    pub const fn for_points(points: i32) -> Self {
        if points >= VIP_THRESHOLD {
            Self::Vip
        } else {
            Self::Normal
        }
    }
}

/// Free credits earned with `points`.
#[must_use]
pub const fn free_credits(points: i32) -> i32 {
    if points <= 0 { 0 } else { points / POINTS_PER_CREDIT }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_boundary() {
        assert_eq!(LoyaltyTier::for_points(19), LoyaltyTier::Normal);
        assert_eq!(LoyaltyTier::for_points(20), LoyaltyTier::Vip);
    }

    #[test]
    fn credits_every_five_points() {
        assert_eq!(free_credits(0), 0);
        assert_eq!(free_credits(4), 0);
        assert_eq!(free_credits(5), 1);
        assert_eq!(free_credits(23), 4);
    }

    #[test]
    fn tier_serializes_upper_case() {
        let json = serde_json::to_string(&LoyaltyTier::Vip).unwrap_or_default();
        assert_eq!(json, "\"VIP\"");
    }
}
