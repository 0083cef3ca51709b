pub const WEIGHING_RECORDS: &str = "weighing_records";
pub const SETTINGS: &str = "settings";

// Reference data
pub const VEHICLES: &str = "vehicles";
pub const CARGO_TYPES: &str = "cargo_types";
pub const SEASONS: &str = "seasons";
pub const DESTINATIONS: &str = "destinations";
pub const FIELDS: &str = "fields";
pub const SOURCES: &str = "sources";

// Secondary index trees
pub const RECORDS_BY_TIME: &str = "idx_records_by_time";
