use chrono::{DateTime, Utc};

use scale_logbook::store::operations::records::WeighingRecord;
use scale_logbook::store::operations::reference::{
    CargoType, Destination, DestinationCategory, Season, Source, Vehicle,
};
use scale_logbook::store::Store;

/// Ids of one complete set of reference rows.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub vehicle_id: String,
    pub cargo_type_id: String,
    pub season_id: String,
    pub source_id: String,
    pub from_id: String,
    pub to_id: String,
}

pub fn seed_catalog(store: &Store) -> Catalog {
    let mut vehicle = Vehicle {
        id: String::new(),
        name: "MAN TGS".to_string(),
        number: Some("A123BC".to_string()),
        tare_weight: 6_000.0,
        description: None,
    };
    store.put_reference(&mut vehicle).expect("seed vehicle");

    let mut cargo = CargoType {
        id: String::new(),
        name: "Wheat".to_string(),
        variety: Some("Moskovskaya".to_string()),
        kind: Some("Winter".to_string()),
    };
    store.put_reference(&mut cargo).expect("seed cargo type");

    let mut season = Season {
        id: String::new(),
        name: "Harvest 2024".to_string(),
        created_at: Utc::now(),
    };
    store.put_reference(&mut season).expect("seed season");

    let mut source = Source {
        id: String::new(),
        name: "Combine 2".to_string(),
        description: None,
    };
    store.put_reference(&mut source).expect("seed source");

    let mut from = Destination {
        id: String::new(),
        name: "Riverside".to_string(),
        category: DestinationCategory::Field,
        field_id: None,
        location: None,
        description: None,
    };
    store.put_reference(&mut from).expect("seed origin");

    let mut to = Destination {
        id: String::new(),
        name: "North".to_string(),
        category: DestinationCategory::Storage,
        field_id: None,
        location: None,
        description: None,
    };
    store.put_reference(&mut to).expect("seed destination");

    Catalog {
        vehicle_id: vehicle.id,
        cargo_type_id: cargo.id,
        season_id: season.id,
        source_id: source.id,
        from_id: from.id,
        to_id: to.id,
    }
}

pub fn seed_weighing(
    store: &Store,
    catalog: &Catalog,
    timestamp: DateTime<Utc>,
    net_weight: f64,
) -> WeighingRecord {
    let tare_weight = 6_000.0;
    let record = WeighingRecord {
        id: uuid::Uuid::new_v4().to_string(),
        timestamp,
        vehicle_id: catalog.vehicle_id.clone(),
        cargo_type_id: catalog.cargo_type_id.clone(),
        season_id: catalog.season_id.clone(),
        source_id: Some(catalog.source_id.clone()),
        from_id: catalog.from_id.clone(),
        to_id: catalog.to_id.clone(),
        gross_weight: net_weight + tare_weight,
        tare_weight,
        net_weight,
        comment: None,
    };
    store.create_weighing_record(&record).expect("seed weighing");
    record
}
