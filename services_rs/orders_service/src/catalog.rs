//! Static flight catalog. Every flight is expanded into cabin offerings with
//! three priced fare bundles; dates are relative to a configurable base day.

use chrono::{Duration, NaiveDate};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CabinClass {
    Economy,
    Bisnis,
}

impl CabinClass {
    pub fn as_str(self) -> &'static str {
        match self {
            CabinClass::Economy => "Economy",
            CabinClass::Bisnis => "Bisnis",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FareOption {
    pub code: String,
    pub name: &'static str,
    pub price: i64,
    pub description: String,
    pub perks: Vec<String>,
    pub reschedule_fee: i64,
    pub refundable_up_to: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CabinOffering {
    pub cabin_class: CabinClass,
    pub fare_options: Vec<FareOption>,
}

impl CabinOffering {
    /// Requested fare, or the first bundle when no code is given.
    pub fn fare(&self, code: Option<&str>) -> Option<&FareOption> {
        match code.map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => self.fare_options.iter().find(|f| f.code == code),
            None => self.fare_options.first(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Flight {
    pub id: String,
    pub airline: &'static str,
    pub code: &'static str,
    pub from: &'static str,
    pub to: &'static str,
    pub depart_time: &'static str,
    pub arrive_time: &'static str,
    pub duration: &'static str,
    pub stops: u8,
    pub fare_summary: String,
    pub badges: Vec<&'static str>,
    pub logo: &'static str,
    pub depart_date: NaiveDate,
    pub offerings: Vec<CabinOffering>,
    pub cheapest_price: i64,
}

impl Flight {
    /// Offering for the requested cabin (case-insensitive). Flights that do
    /// not sell that cabin fall back to their first offering.
    pub fn offering(&self, cabin: &str) -> Option<&CabinOffering> {
        let cabin = cabin.trim();
        self.offerings
            .iter()
            .find(|o| o.cabin_class.as_str().eq_ignore_ascii_case(cabin))
            .or_else(|| self.offerings.first())
    }
}

struct RawFlight {
    id: &'static str,
    airline: &'static str,
    code: &'static str,
    from: &'static str,
    to: &'static str,
    depart_time: &'static str,
    arrive_time: &'static str,
    duration: &'static str,
    stops: u8,
    price: i64,
    fare: &'static str,
    cabin: CabinClass,
    logo: &'static str,
    badges: &'static [&'static str],
    offset_days: i64,
}

macro_rules! raw {
    ($id:literal, $airline:literal, $code:literal, $from:literal, $to:literal,
     $dep:literal, $arr:literal, $dur:literal, $stops:literal, $price:literal,
     $fare:literal, $cabin:ident, $logo:literal, [$($badge:literal),*], $offset:literal) => {
        RawFlight {
            id: $id,
            airline: $airline,
            code: $code,
            from: $from,
            to: $to,
            depart_time: $dep,
            arrive_time: $arr,
            duration: $dur,
            stops: $stops,
            price: $price,
            fare: $fare,
            cabin: CabinClass::$cabin,
            logo: $logo,
            badges: &[$($badge),*],
            offset_days: $offset,
        }
    };
}

const RAW_FLIGHTS: &[RawFlight] = &[
    raw!("GA210", "Garuda Indonesia", "GA 210", "CGK", "DPS", "06:00", "08:55", "1h 55m", 0, 1_200_000, "Meal + Bagasi 20kg", Economy, "/airlines/garuda-indonesia.png", ["Best"], 0),
    raw!("JT12", "Lion Air", "JT 12", "CGK", "DPS", "07:30", "09:35", "2h 05m", 0, 850_000, "Bagasi 20kg", Economy, "/airlines/lion-air.png", [], 0),
    raw!("QG800", "Citilink", "QG 800", "CGK", "DPS", "11:10", "13:10", "2h 00m", 0, 780_000, "Hand carry", Economy, "/airlines/citilink.png", [], 0),
    raw!("ID6503", "Batik Air", "ID 6503", "CGK", "DPS", "08:20", "09:45", "1h 25m", 0, 820_000, "Snack", Economy, "/airlines/batik-air.png", [], 0),
    raw!("QG702", "Citilink", "QG 702", "CGK", "DPS", "14:05", "15:35", "1h 30m", 0, 720_000, "Hand carry", Economy, "/airlines/citilink.png", [], 0),
    raw!("IU780", "Super Air Jet", "IU 780", "CGK", "DPS", "17:40", "19:45", "2h 05m", 0, 690_000, "Basic", Economy, "/airlines/super-air-jet.png", ["Value"], 0),
    raw!("QZ7516", "AirAsia", "QZ 7516", "DPS", "CGK", "09:00", "10:55", "1h 55m", 0, 700_000, "Economy Basic", Economy, "/airlines/airasia.png", [], 0),
    raw!("GA411", "Garuda Indonesia", "GA 411", "DPS", "CGK", "12:30", "14:25", "1h 55m", 0, 2_450_000, "Meal premium", Bisnis, "/airlines/garuda-indonesia.png", ["Refundable", "Bisnis"], 1),
    raw!("JT509", "Lion Air", "JT 509", "SUB", "CGK", "06:20", "07:50", "1h 30m", 0, 650_000, "Bagasi 20kg", Economy, "/airlines/lion-air.png", [], 0),
    raw!("GA321", "Garuda Indonesia", "GA 321", "SUB", "CGK", "18:10", "19:35", "1h 25m", 0, 1_200_000, "Meal", Economy, "/airlines/garuda-indonesia.png", [], 2),
    raw!("QG745", "Citilink", "QG 745", "DPS", "SUB", "15:20", "16:25", "1h 05m", 0, 600_000, "Hand carry", Economy, "/airlines/citilink.png", [], 1),
    raw!("ID6580", "Batik Air", "ID 6580", "SUB", "DPS", "20:10", "21:20", "1h 10m", 0, 620_000, "Snack", Economy, "/airlines/batik-air.png", [], 3),
    raw!("GA9001", "Garuda Indonesia", "GA 9001", "CGK", "DPS", "10:00", "13:45", "3h 45m", 1, 1_600_000, "Snack", Economy, "/airlines/garuda-indonesia.png", [], 0),
    raw!("JT901", "Lion Air", "JT 901", "CGK", "SUB", "13:15", "16:10", "2h 55m", 1, 900_000, "1 stop via DPS", Economy, "/airlines/lion-air.png", [], 1),
    raw!("QZ7001", "AirAsia", "QZ 7001", "DPS", "SUB", "07:10", "09:20", "2h 10m", 1, 750_000, "1 stop via CGK", Economy, "/airlines/airasia.png", [], 2),
    raw!("QZ200", "AirAsia", "QZ 200", "CGK", "KUL", "06:30", "08:25", "1h 55m", 0, 1_000_000, "Basic", Economy, "/airlines/airasia.png", [], 0),
    raw!("TR281", "Scoot", "TR 281", "CGK", "SIN", "11:00", "12:45", "1h 45m", 0, 1_300_000, "Basic", Economy, "/airlines/scoot.png", [], 1),
    raw!("GA846", "Garuda Indonesia", "GA 846", "DPS", "SIN", "09:40", "12:15", "2h 35m", 0, 1_900_000, "Meal", Economy, "/airlines/garuda-indonesia.png", [], 2),
    raw!("JT300", "Lion Air", "JT 300", "CGK", "KNO", "07:00", "09:10", "2h 10m", 0, 950_000, "Bagasi 20kg", Economy, "/airlines/lion-air.png", [], 0),
    raw!("QG310", "Citilink", "QG 310", "KNO", "CGK", "12:00", "14:10", "2h 10m", 0, 900_000, "Hand carry", Economy, "/airlines/citilink.png", [], 1),
    raw!("GA540", "Garuda Indonesia", "GA 540", "UPG", "CGK", "06:30", "09:05", "2h 35m", 0, 1_600_000, "Meal", Economy, "/airlines/garuda-indonesia.png", [], 0),
    raw!("ID700", "Batik Air", "ID 700", "CGK", "UPG", "16:30", "19:05", "2h 35m", 0, 1_400_000, "Snack", Economy, "/airlines/batik-air.png", [], 2),
    raw!("IU522", "Super Air Jet", "IU 522", "BDO", "SUB", "09:20", "10:35", "1h 15m", 0, 620_000, "Basic", Economy, "/airlines/super-air-jet.png", [], 1),
    raw!("QG520", "Citilink", "QG 520", "SUB", "BDO", "18:20", "19:35", "1h 15m", 0, 630_000, "Hand carry", Economy, "/airlines/citilink.png", [], 2),
];

fn describe(fare: &str, fallback: &str) -> String {
    let fare = fare.trim();
    if fare.is_empty() {
        fallback.to_string()
    } else {
        fare.to_string()
    }
}

struct Bundle {
    suffix: &'static str,
    name: &'static str,
    surcharge: i64,
    description: Option<&'static str>,
    perks: &'static [&'static str],
    reschedule_fee: i64,
    refundable_up_to: i32,
}

const ECONOMY_BUNDLES: &[Bundle] = &[
    Bundle {
        suffix: "ECO-LITE",
        name: "Lite",
        surcharge: 0,
        description: None,
        perks: &["Bagasi kabin 7 kg", "Check-in online"],
        reschedule_fee: 250_000,
        refundable_up_to: 0,
    },
    Bundle {
        suffix: "ECO-VALUE",
        name: "Value",
        surcharge: 150_000,
        description: Some("Termasuk bagasi 20 kg"),
        perks: &["Bagasi kabin 7 kg", "Bagasi 20 kg", "Pilih kursi gratis"],
        reschedule_fee: 150_000,
        refundable_up_to: 25,
    },
    Bundle {
        suffix: "ECO-FLEX",
        name: "Flex",
        surcharge: 320_000,
        description: Some("Fleksibel: refund & perubahan mudah"),
        perks: &[
            "Bagasi kabin 7 kg",
            "Bagasi 25 kg",
            "Prioritas boarding",
            "Perubahan jadwal tanpa biaya",
            "Refund hingga 75%",
        ],
        reschedule_fee: 0,
        refundable_up_to: 75,
    },
];

const BUSINESS_BUNDLES: &[Bundle] = &[
    Bundle {
        suffix: "BIZ-SAVER",
        name: "Saver",
        surcharge: 0,
        description: None,
        perks: &["Bagasi kabin 10 kg", "Kursi recliner", "Makanan hangat"],
        reschedule_fee: 350_000,
        refundable_up_to: 30,
    },
    Bundle {
        suffix: "BIZ-VALUE",
        name: "Value",
        surcharge: 300_000,
        description: Some("Termasuk lounge dan bagasi 30 kg"),
        perks: &[
            "Bagasi kabin 10 kg",
            "Bagasi 30 kg",
            "Akses lounge bandara",
            "Prioritas boarding",
        ],
        reschedule_fee: 200_000,
        refundable_up_to: 60,
    },
    Bundle {
        suffix: "BIZ-FLEX",
        name: "Flex",
        surcharge: 550_000,
        description: Some("Full flex: reschedule & refund tanpa biaya"),
        perks: &[
            "Bagasi kabin 12 kg",
            "Bagasi 35 kg",
            "Lounge premium",
            "Layanan pick-up bandara (kota tertentu)",
            "Refund hingga 85%",
        ],
        reschedule_fee: 0,
        refundable_up_to: 85,
    },
];

fn build_fares(raw: &RawFlight) -> Vec<FareOption> {
    let (bundles, fallback) = match raw.cabin {
        CabinClass::Economy => (ECONOMY_BUNDLES, "Fasilitas dasar ekonomi"),
        CabinClass::Bisnis => (BUSINESS_BUNDLES, "Fasilitas kabin bisnis"),
    };
    let base_description = describe(raw.fare, fallback);
    bundles
        .iter()
        .map(|b| {
            let mut perks = Vec::with_capacity(b.perks.len() + 1);
            perks.push(base_description.clone());
            perks.extend(b.perks.iter().map(|p| p.to_string()));
            FareOption {
                code: format!("{}-{}", raw.id, b.suffix),
                name: b.name,
                price: raw.price + b.surcharge,
                description: b
                    .description
                    .map(str::to_string)
                    .unwrap_or_else(|| base_description.clone()),
                perks,
                reschedule_fee: b.reschedule_fee,
                refundable_up_to: b.refundable_up_to,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopsFilter {
    #[default]
    Any,
    Nonstop,
    Transit,
}

impl StopsFilter {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "any" => Some(Self::Any),
            "nonstop" => Some(Self::Nonstop),
            "transit" => Some(Self::Transit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Price,
    Duration,
    DepartAsc,
    DepartDesc,
    ArriveAsc,
    ArriveDesc,
}

impl SortKey {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "price" => Some(Self::Price),
            "duration" => Some(Self::Duration),
            "depart-asc" => Some(Self::DepartAsc),
            "depart-desc" => Some(Self::DepartDesc),
            "arrive-asc" => Some(Self::ArriveAsc),
            "arrive-desc" => Some(Self::ArriveDesc),
            _ => None,
        }
    }
}

pub const DEFAULT_PRICE_MAX: i64 = 5_000_000;

#[derive(Debug, Clone)]
pub struct FlightQuery {
    pub from: String,
    pub to: String,
    pub depart: Option<NaiveDate>,
    pub stops: StopsFilter,
    pub airlines: Vec<String>,
    pub price_min: i64,
    pub price_max: i64,
    pub sort: SortKey,
}

/// Minutes from either a duration (`2h 05m`) or a clock time (`07:30`).
fn parse_minutes(raw: &str) -> u32 {
    let number = |s: &str| -> u32 {
        s.chars()
            .filter(char::is_ascii_digit)
            .collect::<String>()
            .parse()
            .unwrap_or(0)
    };
    if let Some((h, m)) = raw.split_once('h') {
        number(h) * 60 + number(m)
    } else if let Some((h, m)) = raw.split_once(':') {
        number(h) * 60 + number(m)
    } else {
        number(raw)
    }
}

#[derive(Debug, Clone)]
pub struct Catalog {
    flights: Vec<Flight>,
}

impl Catalog {
    pub fn mock(base_date: NaiveDate) -> Self {
        let mut flights: Vec<Flight> = Vec::new();
        for raw in RAW_FLIGHTS {
            let depart_date = base_date + Duration::days(raw.offset_days);
            let idx = match flights.iter().position(|f| f.id == raw.id) {
                Some(i) => i,
                None => {
                    flights.push(Flight {
                        id: raw.id.to_string(),
                        airline: raw.airline,
                        code: raw.code,
                        from: raw.from,
                        to: raw.to,
                        depart_time: raw.depart_time,
                        arrive_time: raw.arrive_time,
                        duration: raw.duration,
                        stops: raw.stops,
                        fare_summary: describe(raw.fare, "Fasilitas standar"),
                        badges: Vec::new(),
                        logo: raw.logo,
                        depart_date,
                        offerings: Vec::new(),
                        cheapest_price: i64::MAX,
                    });
                    flights.len() - 1
                }
            };

            let flight = &mut flights[idx];
            if depart_date < flight.depart_date {
                flight.depart_date = depart_date;
            }
            for badge in raw.badges {
                if !flight.badges.contains(badge) {
                    flight.badges.push(*badge);
                }
            }
            let offering = CabinOffering {
                cabin_class: raw.cabin,
                fare_options: build_fares(raw),
            };
            match flight
                .offerings
                .iter_mut()
                .find(|o| o.cabin_class == raw.cabin)
            {
                Some(existing) => *existing = offering,
                None => flight.offerings.push(offering),
            }
        }

        for flight in &mut flights {
            flight.cheapest_price = flight
                .offerings
                .iter()
                .flat_map(|o| o.fare_options.iter().map(|f| f.price))
                .min()
                .unwrap_or(0);
        }
        Self { flights }
    }

    pub fn flights(&self) -> &[Flight] {
        &self.flights
    }

    pub fn flight(&self, id: &str) -> Option<&Flight> {
        let id = id.trim();
        self.flights.iter().find(|f| f.id == id)
    }

    pub fn search(&self, q: &FlightQuery) -> Vec<&Flight> {
        if q.from.trim().is_empty() || q.to.trim().is_empty() {
            return Vec::new();
        }
        let from = q.from.trim().to_ascii_uppercase();
        let to = q.to.trim().to_ascii_uppercase();

        let mut out: Vec<&Flight> = self
            .flights
            .iter()
            .filter(|f| f.from.contains(from.as_str()) && f.to.contains(to.as_str()))
            .filter(|f| q.depart.map_or(true, |d| f.depart_date == d))
            .filter(|f| match q.stops {
                StopsFilter::Any => true,
                StopsFilter::Nonstop => f.stops == 0,
                StopsFilter::Transit => f.stops > 0,
            })
            .filter(|f| q.airlines.is_empty() || q.airlines.iter().any(|a| a == f.airline))
            .filter(|f| f.cheapest_price >= q.price_min && f.cheapest_price <= q.price_max)
            .collect();

        match q.sort {
            SortKey::Price => out.sort_by_key(|f| f.cheapest_price),
            SortKey::Duration => out.sort_by_key(|f| parse_minutes(f.duration)),
            SortKey::DepartAsc => out.sort_by_key(|f| parse_minutes(f.depart_time)),
            SortKey::DepartDesc => {
                out.sort_by_key(|f| std::cmp::Reverse(parse_minutes(f.depart_time)))
            }
            SortKey::ArriveAsc => out.sort_by_key(|f| parse_minutes(f.arrive_time)),
            SortKey::ArriveDesc => {
                out.sort_by_key(|f| std::cmp::Reverse(parse_minutes(f.arrive_time)))
            }
        }
        out
    }
}
