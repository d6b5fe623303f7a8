//! # Fee Schedule
//!
//! Maps `(category, currency, submission date, payment mode)` to an itemised
//! fee. Two independent tables are keyed by currency: the national (INR)
//! table carries GST, the international (USD) table does not.
//!
//! The calculator runs twice per payment: once as a client preview and once
//! as the authoritative server recomputation. Both must be pure functions of
//! their inputs.
//!
//! ## Period Cutoffs
//!
//! | Period    | Submission date          |
//! |-----------|--------------------------|
//! | `early`   | on or before 2025-07-15  |
//! | `regular` | on or before 2025-11-20  |
//! | `late`    | after 2025-11-20         |

use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

const EARLY_CUTOFF: (i32, u32, u32) = (2025, 7, 15);
const REGULAR_CUTOFF: (i32, u32, u32) = (2025, 11, 20);

// ── Period ──────────────────────────────────────────────────────────────────

/// Pricing tier derived from the submission date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeePeriod {
    /// Early-bird pricing.
    Early,
    /// Standard pricing.
    Regular,
    /// Late pricing.
    Late,
}

impl FeePeriod {
    /// Select the period for a submission date. Cutoff days are inclusive.
    pub fn for_date(date: NaiveDate) -> Self {
        let key = (date.year(), date.month(), date.day());
        if key <= EARLY_CUTOFF {
            Self::Early
        } else if key <= REGULAR_CUTOFF {
            Self::Regular
        } else {
            Self::Late
        }
    }

    /// Return the string representation of this period.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Early => "early",
            Self::Regular => "regular",
            Self::Late => "late",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Early => 0,
            Self::Regular => 1,
            Self::Late => 2,
        }
    }
}

impl fmt::Display for FeePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Category / Currency / Mode ──────────────────────────────────────────────

/// Registrant categories with a published fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeeCategory {
    /// "Speaker / Participant"
    SpeakerParticipant,
    /// "Accompanying Person"
    AccompanyingPerson,
    /// "Student / Speaker"
    StudentSpeaker,
    /// "Student / Participant"
    StudentParticipant,
}

impl FeeCategory {
    /// All categories in table order.
    pub const ALL: [FeeCategory; 4] = [
        Self::SpeakerParticipant,
        Self::AccompanyingPerson,
        Self::StudentSpeaker,
        Self::StudentParticipant,
    ];

    /// Display label, which is also the wire key clients send.
    pub fn label(&self) -> &'static str {
        match self {
            Self::SpeakerParticipant => "Speaker / Participant",
            Self::AccompanyingPerson => "Accompanying Person",
            Self::StudentSpeaker => "Student / Speaker",
            Self::StudentParticipant => "Student / Participant",
        }
    }

    /// Look up a category by its label. Surrounding whitespace is ignored.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL.into_iter().find(|c| c.label() == label)
    }

    fn index(self) -> usize {
        match self {
            Self::SpeakerParticipant => 0,
            Self::AccompanyingPerson => 1,
            Self::StudentSpeaker => 2,
            Self::StudentParticipant => 3,
        }
    }
}

/// Settlement currency. Selects the fee table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Indian rupee; national table with GST.
    Inr,
    /// US dollar; international table without GST.
    Usd,
}

impl Currency {
    /// ISO 4217 code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Inr => "INR",
            Self::Usd => "USD",
        }
    }

    /// Parse an ISO code, case-insensitively.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "INR" => Some(Self::Inr),
            "USD" => Some(Self::Usd),
            _ => None,
        }
    }

    /// Currency symbol used in receipts.
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Inr => "₹",
            Self::Usd => "$",
        }
    }
}

/// How the registrant pays. Platform fees apply to online payments only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    /// Gateway checkout.
    Online,
    /// Bank transfer or any other offline channel.
    Offline,
}

impl PaymentMode {
    /// Interpret a client-supplied mode. Only `"online"` is online; anything
    /// else, including absence, is treated as offline.
    pub fn from_client(mode: Option<&str>) -> Self {
        match mode.map(str::trim) {
            Some(m) if m.eq_ignore_ascii_case("online") => Self::Online,
            _ => Self::Offline,
        }
    }
}

// ── Tables ──────────────────────────────────────────────────────────────────

/// Components of a single category's fee, in whole currency units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeeComponents {
    /// Registration fee.
    pub base: u64,
    /// Goods and services tax (INR only).
    pub gst: u64,
    /// Payment platform fee.
    pub platform: u64,
}

impl FeeComponents {
    const fn new(base: u64, gst: u64, platform: u64) -> Self {
        Self {
            base,
            gst,
            platform,
        }
    }

    /// Sum of all components.
    pub fn total(&self) -> u64 {
        self.base + self.gst + self.platform
    }
}

type FeeTable = [[FeeComponents; 3]; 4];

/// National fees (INR). Rows follow [`FeeCategory::ALL`], columns early/regular/late.
const NATIONAL_FEES: FeeTable = [
    [
        FeeComponents::new(13000, 2340, 360),
        FeeComponents::new(16000, 2880, 420),
        FeeComponents::new(19000, 3420, 500),
    ],
    [
        FeeComponents::new(7000, 1260, 200),
        FeeComponents::new(9000, 1620, 300),
        FeeComponents::new(9000, 1620, 300),
    ],
    [
        FeeComponents::new(1000, 180, 30),
        FeeComponents::new(1000, 180, 30),
        FeeComponents::new(1000, 180, 30),
    ],
    [
        FeeComponents::new(4000, 720, 120),
        FeeComponents::new(4000, 720, 120),
        FeeComponents::new(4000, 720, 120),
    ],
];

/// International fees (USD). No GST.
const INTERNATIONAL_FEES: FeeTable = [
    [
        FeeComponents::new(350, 0, 13),
        FeeComponents::new(400, 0, 14),
        FeeComponents::new(500, 0, 18),
    ],
    [
        FeeComponents::new(200, 0, 7),
        FeeComponents::new(250, 0, 9),
        FeeComponents::new(250, 0, 9),
    ],
    [
        FeeComponents::new(100, 0, 4),
        FeeComponents::new(100, 0, 4),
        FeeComponents::new(100, 0, 4),
    ],
    [
        FeeComponents::new(150, 0, 5),
        FeeComponents::new(150, 0, 5),
        FeeComponents::new(150, 0, 5),
    ],
];

/// Published fee for a category in a currency and period, platform fee included.
pub fn schedule(category: FeeCategory, currency: Currency, period: FeePeriod) -> FeeComponents {
    let table = match currency {
        Currency::Inr => &NATIONAL_FEES,
        Currency::Usd => &INTERNATIONAL_FEES,
    };
    table[category.index()][period.index()]
}

// ── Computation ─────────────────────────────────────────────────────────────

/// One selected category, as sent by clients and stored in payment notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySelection {
    /// Category label, e.g. `"Student / Participant"`.
    #[serde(alias = "key")]
    pub category: String,
    /// Currency code, e.g. `"INR"`.
    pub currency: String,
}

/// Itemised fee for one category, tagged with its source for receipts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeLine {
    /// Category label as submitted.
    pub category: String,
    /// Currency code as submitted.
    pub currency: String,
    /// Registration fee.
    pub base_fee: u64,
    /// GST component.
    pub gst: u64,
    /// Platform fee component (zero for offline payments).
    pub platform: u64,
    /// `base_fee + gst + platform`.
    pub total_amount: u64,
}

/// Compute the fee for one category.
///
/// An unknown category or currency yields an all-zero line. This is a data
/// integrity problem upstream, not a caller error, so it is logged and the
/// payment flow continues.
pub fn compute_fee(category: &str, currency: &str, date: NaiveDate, mode: PaymentMode) -> FeeLine {
    let components = match (FeeCategory::from_label(category), Currency::from_code(currency)) {
        (Some(cat), Some(cur)) => {
            let mut fee = schedule(cat, cur, FeePeriod::for_date(date));
            if mode != PaymentMode::Online {
                fee.platform = 0;
            }
            fee
        }
        _ => {
            tracing::warn!(
                category = %category,
                currency = %currency,
                "no fee table entry for category/currency; using zero fee"
            );
            FeeComponents::default()
        }
    };

    FeeLine {
        category: category.to_string(),
        currency: currency.to_string(),
        base_fee: components.base,
        gst: components.gst,
        platform: components.platform,
        total_amount: components.total(),
    }
}

/// Itemised fee for a whole selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeQuote {
    /// Period the quote was priced in.
    pub period: FeePeriod,
    /// Mode the quote was priced for.
    pub mode: PaymentMode,
    /// One line per selected category, in selection order.
    pub lines: Vec<FeeLine>,
    /// Sum of every line's `total_amount`.
    pub total: u64,
}

/// Price a multi-category selection. Each category carries its own currency.
pub fn quote(selection: &[CategorySelection], date: NaiveDate, mode: PaymentMode) -> FeeQuote {
    let lines: Vec<FeeLine> = selection
        .iter()
        .map(|s| compute_fee(&s.category, &s.currency, date, mode))
        .collect();
    let total = lines.iter().map(|l| l.total_amount).sum();
    FeeQuote {
        period: FeePeriod::for_date(date),
        mode,
        lines,
        total,
    }
}
