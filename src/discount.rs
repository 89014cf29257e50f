use crate::duration::parse_duration;

/// Minutes added to the parked time to cover the delay until the tickets are redeemed.
const GRACE_MINUTES: i64 = 5;
/// From this many minutes on, a single day pass is cheaper than hourly tickets.
const DAY_PASS_THRESHOLD_MINUTES: i64 = 300;

pub const ENTRY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Discount tickets offered by the portal.
///
/// The discriminant is the position of the ticket in the portal's redemption list and is
/// part of the submitted action name, so the order must never change.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    enum_iterator::Sequence,
)]
#[repr(u8)]
pub enum DiscountTicket {
    FreeVisit = 0,
    Minutes15 = 1,
    Minutes30 = 2,
    Hour1 = 3,
    DayPass = 4,
    Hours24 = 5,
}

impl DiscountTicket {
    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            DiscountTicket::FreeVisit => "방문권",
            DiscountTicket::Minutes15 => "15분주차권",
            DiscountTicket::Minutes30 => "30분주차권",
            DiscountTicket::Hour1 => "1시간주차권",
            DiscountTicket::DayPass => "당일권",
            DiscountTicket::Hours24 => "24시간권",
        }
    }

    pub fn minutes(self) -> i64 {
        match self {
            DiscountTicket::FreeVisit => 75,
            DiscountTicket::Minutes15 => 15,
            DiscountTicket::Minutes30 => 30,
            DiscountTicket::Hour1 => 60,
            DiscountTicket::DayPass | DiscountTicket::Hours24 => 24 * 60,
        }
    }

    /// Price label shown next to the ticket on the portal.
    pub fn price_label(self) -> &'static str {
        match self {
            DiscountTicket::FreeVisit => "1시간15분무료",
            DiscountTicket::Minutes15 => "1000원",
            DiscountTicket::Minutes30 => "2000원",
            DiscountTicket::Hour1 => "4000원",
            DiscountTicket::DayPass => "15,000원",
            DiscountTicket::Hours24 => "30,000원",
        }
    }
}

impl std::fmt::Display for DiscountTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid entry timestamp - {0}")]
pub struct InvalidEntryTimestamp(pub String);

/// Picks the tickets to redeem for a vehicle parked for `duration_text` since `entered_at`.
///
/// Stays of five hours or more get a day pass when they started today and nothing at all
/// when they crossed midnight; those are settled by hand. Shorter stays always start with
/// the free visit ticket and the rest is covered greedily with 60, 30 and 15 minute
/// tickets, rounding up.
pub fn allocate(
    duration_text: &str,
    entered_at: &str,
    now: chrono::NaiveDateTime,
) -> Result<Vec<DiscountTicket>, InvalidEntryTimestamp> {
    let mut remaining = i64::from(parse_duration(duration_text)) + GRACE_MINUTES;

    if remaining >= DAY_PASS_THRESHOLD_MINUTES {
        let entered_at =
            chrono::NaiveDateTime::parse_from_str(entered_at.trim(), ENTRY_TIMESTAMP_FORMAT)
                .map_err(|_| InvalidEntryTimestamp(entered_at.to_string()))?;

        return Ok(if entered_at.date() == now.date() {
            vec![DiscountTicket::DayPass]
        } else {
            vec![]
        });
    }

    let mut tickets = vec![DiscountTicket::FreeVisit];
    remaining -= DiscountTicket::FreeVisit.minutes();

    while remaining > 0 {
        let ticket = if remaining >= DiscountTicket::Hour1.minutes() {
            DiscountTicket::Hour1
        } else if remaining >= DiscountTicket::Minutes30.minutes() {
            DiscountTicket::Minutes30
        } else {
            DiscountTicket::Minutes15
        };
        tickets.push(ticket);
        remaining -= ticket.minutes();
    }

    Ok(tickets)
}
