//! Calendar rows: the provider calendars an account's events are mirrored
//! into, cleaned up as part of the deletion workflow alongside events and
//! relationships — grounded on the `calendars` table shape used alongside
//! calendar events in the broader pack's calendar-database modules.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Calendar {
    pub calendar_id: String,
    pub account_id: String,
    pub provider_calendar_id: Option<String>,
    pub display_name: Option<String>,
    pub is_primary: bool,
}
