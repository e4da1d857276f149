use serde::Serialize;

use super::Rejection;
use crate::models::users::User;

pub const DEFAULT_REFERRAL_BONUS: f64 = 0.10;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReferralError {
    #[error("A referral code was already redeemed on this account")]
    AlreadyReferred,
    #[error("You cannot redeem your own referral code")]
    SelfReferral,
    #[error("Referral code {0} does not exist")]
    InvalidCode(String),
}

impl Rejection for ReferralError {
    fn code(&self) -> &'static str {
        match self {
            ReferralError::AlreadyReferred => "ALREADY_REFERRED",
            ReferralError::SelfReferral => "SELF_REFERRAL",
            ReferralError::InvalidCode(_) => "INVALID_CODE",
        }
    }
}

/// Bonus bracket of a referrer, keyed on referrals made so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReferralTier {
    Bronze,
    Silver,
    Gold,
}

impl ReferralTier {
    pub fn for_count(referral_count: i64) -> Self {
        match referral_count {
            c if c >= 20 => ReferralTier::Gold,
            c if c >= 5 => ReferralTier::Silver,
            _ => ReferralTier::Bronze,
        }
    }

    pub fn multiplier(&self) -> f64 {
        match self {
            ReferralTier::Bronze => 1.0,
            ReferralTier::Silver => 1.5,
            ReferralTier::Gold => 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Redeemed {
    pub referrer_id: String,
    pub tier: ReferralTier,
    pub referrer_reward: f64,
    pub referee_reward: f64,
}

/// Links `referee` to the owner of `code` and pays both sides.
///
/// `referrer` is the record holding `code`, or `None` if no other account
/// holds it. Both records must be written back in the same transaction.
pub fn redeem_referral(
    referee: &mut User,
    referrer: Option<&mut User>,
    code: &str,
    base_bonus: f64,
) -> Result<Redeemed, ReferralError> {
    if referee.referred_by.is_some() {
        return Err(ReferralError::AlreadyReferred);
    }
    if referee.referral_code == code {
        return Err(ReferralError::SelfReferral);
    }
    let referrer = match referrer {
        Some(referrer) if referrer.uid != referee.uid => referrer,
        _ => return Err(ReferralError::InvalidCode(code.to_string())),
    };

    let base_bonus = if base_bonus > 0.0 {
        base_bonus
    } else {
        DEFAULT_REFERRAL_BONUS
    };
    let tier = ReferralTier::for_count(referrer.referral_count);
    let referrer_reward = base_bonus * tier.multiplier();
    let referee_reward = base_bonus / 2.0;

    referrer.balance += referrer_reward;
    referrer.referral_count += 1;

    referee.referred_by = Some(referrer.uid.clone());
    referee.balance += referee_reward;

    Ok(Redeemed {
        referrer_id: referrer.uid.clone(),
        tier,
        referrer_reward,
        referee_reward,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::testing::{at, user_at};

    fn pair(referrals: i64) -> (User, User) {
        let now = at(2024, 5, 1, 12);
        let mut referrer = user_at("r1", now);
        referrer.referral_code = "RRR111".into();
        referrer.referral_count = referrals;
        let mut referee = user_at("u1", now);
        referee.referral_code = "UUU111".into();
        (referrer, referee)
    }

    #[test]
    fn tier_boundaries() {
        assert_eq!(ReferralTier::for_count(0), ReferralTier::Bronze);
        assert_eq!(ReferralTier::for_count(4), ReferralTier::Bronze);
        assert_eq!(ReferralTier::for_count(5), ReferralTier::Silver);
        assert_eq!(ReferralTier::for_count(19), ReferralTier::Silver);
        assert_eq!(ReferralTier::for_count(20), ReferralTier::Gold);
        assert_eq!(ReferralTier::for_count(19).multiplier(), 1.5);
        assert_eq!(ReferralTier::for_count(20).multiplier(), 2.0);
        assert_eq!(ReferralTier::for_count(4).multiplier(), 1.0);
    }

    #[test]
    fn redemption_pays_both_sides_once() {
        let (mut referrer, mut referee) = pair(4);

        let redeemed = redeem_referral(&mut referee, Some(&mut referrer), "RRR111", 0.10).unwrap();

        assert_eq!(redeemed.tier, ReferralTier::Bronze);
        assert!((referee.balance - 0.05).abs() < 1e-12);
        assert!((referrer.balance - 0.10).abs() < 1e-12);
        assert_eq!(referrer.referral_count, 5);
        assert_eq!(referee.referred_by.as_deref(), Some("r1"));

        let (referrer_before, referee_before) = (referrer.clone(), referee.clone());
        assert_eq!(
            redeem_referral(&mut referee, Some(&mut referrer), "RRR111", 0.10),
            Err(ReferralError::AlreadyReferred)
        );
        assert_eq!(referrer, referrer_before);
        assert_eq!(referee, referee_before);
    }

    #[test]
    fn gold_referrer_earns_double() {
        let (mut referrer, mut referee) = pair(20);
        let redeemed = redeem_referral(&mut referee, Some(&mut referrer), "RRR111", 0.10).unwrap();

        assert_eq!(redeemed.tier, ReferralTier::Gold);
        assert!((referrer.balance - 0.20).abs() < 1e-12);
        assert!((referee.balance - 0.05).abs() < 1e-12);
    }

    #[test]
    fn own_code_is_refused() {
        let (_, mut referee) = pair(0);
        assert_eq!(
            redeem_referral(&mut referee, None, "UUU111", 0.10),
            Err(ReferralError::SelfReferral)
        );
        assert!(referee.referred_by.is_none());
    }

    #[test]
    fn unknown_code_is_refused() {
        let (_, mut referee) = pair(0);
        assert_eq!(
            redeem_referral(&mut referee, None, "NOPE00", 0.10),
            Err(ReferralError::InvalidCode("NOPE00".into()))
        );
        assert_eq!(referee.balance, 0.0);
    }

    #[test]
    fn missing_base_bonus_falls_back_to_default() {
        let (mut referrer, mut referee) = pair(5);
        let redeemed = redeem_referral(&mut referee, Some(&mut referrer), "RRR111", 0.0).unwrap();

        assert!((redeemed.referrer_reward - 0.15).abs() < 1e-12);
        assert!((redeemed.referee_reward - 0.05).abs() < 1e-12);
    }
}
