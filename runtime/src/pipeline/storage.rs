//! Spot storage collaborators: the `SpotStore` trait, in-memory and SQLite.

use crate::dedup::haversine_m;
use crate::error::StoreError;
use crate::trust::validator::ValidatedSpot;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Meters per degree of latitude.
const M_PER_DEG: f64 = 111_195.0;

pub trait SpotStore: Send + Sync {
    /// Coordinated spots within `radius_m` meters of a point.
    fn query_nearby(&self, lat: f64, lon: f64, radius_m: f64) -> Result<Vec<ValidatedSpot>, StoreError>;

    /// Spots without coordinates from one source.
    fn query_uncoordinated(&self, source_key: &str) -> Result<Vec<ValidatedSpot>, StoreError>;

    /// Insert a spot. `false` when the store refused it.
    fn insert(&self, spot: &ValidatedSpot) -> Result<bool, StoreError>;

    fn count(&self) -> Result<usize, StoreError>;
}

fn within(spot: &ValidatedSpot, lat: f64, lon: f64, radius_m: f64) -> bool {
    spot.coordinates()
        .is_some_and(|c| haversine_m(c, (lat, lon)) <= radius_m)
}

#[derive(Default)]
pub struct MemorySpotStore {
    spots: Mutex<Vec<ValidatedSpot>>,
}

impl MemorySpotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Result<Vec<ValidatedSpot>, StoreError> {
        Ok(self.spots.lock().map_err(|_| StoreError::Poisoned)?.clone())
    }
}

impl SpotStore for MemorySpotStore {
    fn query_nearby(&self, lat: f64, lon: f64, radius_m: f64) -> Result<Vec<ValidatedSpot>, StoreError> {
        let spots = self.spots.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(spots
            .iter()
            .filter(|s| within(s, lat, lon, radius_m))
            .cloned()
            .collect())
    }

    fn query_uncoordinated(&self, source_key: &str) -> Result<Vec<ValidatedSpot>, StoreError> {
        let spots = self.spots.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(spots
            .iter()
            .filter(|s| s.coordinates().is_none() && s.source_key == source_key)
            .cloned()
            .collect())
    }

    fn insert(&self, spot: &ValidatedSpot) -> Result<bool, StoreError> {
        let mut spots = self.spots.lock().map_err(|_| StoreError::Poisoned)?;
        if spots.iter().any(|s| s.id == spot.id) {
            return Ok(false);
        }
        spots.push(spot.clone());
        Ok(true)
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.spots.lock().map_err(|_| StoreError::Poisoned)?.len())
    }
}

/// SQLite spot table. Coordinates are indexed columns; the full spot is JSON.
pub struct SqliteSpotStore {
    db: Mutex<Connection>,
}

impl SqliteSpotStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = Connection::open(path)?;
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS spots (
                id TEXT PRIMARY KEY,
                source_key TEXT NOT NULL,
                lat REAL,
                lon REAL,
                confidence REAL NOT NULL,
                record TEXT NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_spots_lat_lon ON spots(lat, lon);
            CREATE INDEX IF NOT EXISTS idx_spots_source ON spots(source_key);",
        )?;
        Ok(Self { db: Mutex::new(db) })
    }

    /// Default location: ~/.spot-harvest/spots.db.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".spot-harvest")
            .join("spots.db")
    }

    fn decode_rows(
        stmt: &mut rusqlite::Statement<'_>,
        params: impl rusqlite::Params,
    ) -> Result<Vec<ValidatedSpot>, StoreError> {
        let raw = stmt
            .query_map(params, |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<String>, _>>()?;
        raw.iter()
            .map(|r| serde_json::from_str(r).map_err(StoreError::from))
            .collect()
    }
}

impl SpotStore for SqliteSpotStore {
    fn query_nearby(&self, lat: f64, lon: f64, radius_m: f64) -> Result<Vec<ValidatedSpot>, StoreError> {
        let dlat = radius_m / M_PER_DEG;
        let dlon = dlat / lat.to_radians().cos().abs().max(0.01);
        let db = self.db.lock().map_err(|_| StoreError::Poisoned)?;
        let mut stmt = db.prepare(
            "SELECT record FROM spots
             WHERE lat BETWEEN ?1 AND ?2 AND lon BETWEEN ?3 AND ?4",
        )?;
        let candidates = Self::decode_rows(
            &mut stmt,
            rusqlite::params![lat - dlat, lat + dlat, lon - dlon, lon + dlon],
        )?;
        Ok(candidates
            .into_iter()
            .filter(|s| within(s, lat, lon, radius_m))
            .collect())
    }

    fn query_uncoordinated(&self, source_key: &str) -> Result<Vec<ValidatedSpot>, StoreError> {
        let db = self.db.lock().map_err(|_| StoreError::Poisoned)?;
        let mut stmt = db.prepare(
            "SELECT record FROM spots WHERE lat IS NULL AND source_key = ?1 ORDER BY created_at",
        )?;
        Self::decode_rows(&mut stmt, rusqlite::params![source_key])
    }

    fn insert(&self, spot: &ValidatedSpot) -> Result<bool, StoreError> {
        let record = serde_json::to_string(spot)?;
        let db = self.db.lock().map_err(|_| StoreError::Poisoned)?;
        let rows = db.execute(
            "INSERT OR IGNORE INTO spots (id, source_key, lat, lon, confidence, record)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                spot.id.to_string(),
                spot.source_key,
                spot.lat,
                spot.lon,
                spot.confidence,
                record
            ],
        )?;
        Ok(rows > 0)
    }

    fn count(&self) -> Result<usize, StoreError> {
        let db = self.db.lock().map_err(|_| StoreError::Poisoned)?;
        let n: i64 = db.query_row("SELECT COUNT(*) FROM spots", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}
