//! Offer portfolio: raw catalog rows and their cleaned form.

use crate::{id_map::IdMap, table::Record, types::OfferId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferCategory {
    Bogo,
    Discount,
    Informational,
}

impl OfferCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bogo          => "bogo",
            Self::Discount      => "discount",
            Self::Informational => "informational",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bogo"          => Some(Self::Bogo),
            "discount"      => Some(Self::Discount),
            "informational" => Some(Self::Informational),
            _               => None,
        }
    }

    /// Informational offers have no completion event, so a valid response
    /// can never be observed for them.
    pub fn is_measurable(&self) -> bool {
        !matches!(self, Self::Informational)
    }
}

/// One line of `portfolio.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOffer {
    pub id:         String,
    pub offer_type: OfferCategory,
    pub difficulty: f64,
    pub duration:   f64,
    pub reward:     f64,
    #[serde(default)]
    pub channels:   Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub offer_id:       OfferId,
    pub category:       OfferCategory,
    pub difficulty:     f64,
    pub duration:       f64,
    pub reward:         f64,
    pub channel_email:  bool,
    pub channel_mobile: bool,
    pub channel_social: bool,
    pub channel_web:    bool,
}

impl Record for Offer {
    const COLUMNS: &'static [&'static str] = &[
        "offer_id", "offer_type", "difficulty", "duration", "reward",
        "channel_email", "channel_mobile", "channel_social", "channel_web",
    ];
}

/// Clean the portfolio. `offer_ids` should already hold every portfolio id
/// in file order; ids are looked up through `assign` so the map stays append-only.
pub fn clean_offers(raws: &[RawOffer], offer_ids: &mut IdMap<String>) -> Vec<Offer> {
    raws.iter()
        .map(|raw| {
            let mut offer = Offer {
                offer_id:       offer_ids.assign(raw.id.clone()),
                category:       raw.offer_type,
                difficulty:     raw.difficulty,
                duration:       raw.duration,
                reward:         raw.reward,
                channel_email:  false,
                channel_mobile: false,
                channel_social: false,
                channel_web:    false,
            };
            for channel in &raw.channels {
                match channel.as_str() {
                    "email"  => offer.channel_email = true,
                    "mobile" => offer.channel_mobile = true,
                    "social" => offer.channel_social = true,
                    "web"    => offer.channel_web = true,
                    other    => log::warn!("offer {}: ignoring unknown channel '{other}'", raw.id),
                }
            }
            offer
        })
        .collect()
}
