/*
 * Kessler Toolkit
 * Copyright (C) 2024-onward the Kessler contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! SQLite result store.
//!
//! Three tables: `lambert_scanner_results` holds every evaluated transfer,
//! `sgp4_scanner_results` and `j2_analysis_results` hold the arrival misses
//! keyed by `lambert_transfer_id`. The store is the single source of truth
//! between scan stages: downstream stages read upstream rows through indexed
//! queries and never pass records in memory. Shortlists are ranked queries
//! against the indexed metric columns.

use std::path::Path;

use log::warn;
use rusqlite::{params, Connection};
use snafu::ResultExt;

use crate::astro::elements::KeplerianElements;
use crate::errors::{DatabaseSnafu, ShortlistIoSnafu, StoreError, StoreResult};
use crate::math::Vector3;

pub const LAMBERT_TABLE: &str = "lambert_scanner_results";
pub const SGP4_TABLE: &str = "sgp4_scanner_results";
pub const J2_TABLE: &str = "j2_analysis_results";

/// One evaluated Lambert transfer, as persisted. Angles are stored in
/// radians, distances in kilometers, epochs as Julian dates.
#[derive(Clone, Debug, PartialEq)]
pub struct LambertTransferRecord {
    pub departure_object_id: u64,
    pub arrival_object_id: u64,
    pub departure_epoch_jd: f64,
    pub time_of_flight_s: f64,
    pub revolutions: u32,
    pub prograde: bool,
    pub departure_position_km: Vector3,
    pub departure_velocity_km_s: Vector3,
    pub departure_elements: KeplerianElements,
    pub arrival_position_km: Vector3,
    pub arrival_velocity_km_s: Vector3,
    pub arrival_elements: KeplerianElements,
    pub transfer_elements: KeplerianElements,
    pub departure_delta_v_km_s: Vector3,
    pub arrival_delta_v_km_s: Vector3,
    pub transfer_delta_v_km_s: f64,
}

/// A lambert row together with its store-assigned id.
#[derive(Clone, Debug)]
pub struct StoredLambertTransfer {
    pub transfer_id: i64,
    pub record: LambertTransferRecord,
}

/// Arrival-miss row shape shared by the SGP4 and J2 tables.
#[derive(Clone, Debug, PartialEq)]
pub struct PropagationRecord {
    pub lambert_transfer_id: i64,
    pub arrival_position_km: Vector3,
    pub arrival_velocity_km_s: Vector3,
    pub arrival_position_error_km: Vector3,
    pub arrival_position_error_norm_km: f64,
    pub arrival_velocity_error_km_s: Vector3,
    pub arrival_velocity_error_norm_km_s: f64,
    pub success: bool,
}

impl PropagationRecord {
    /// The zeroed row written for every per-row failure.
    pub fn failed(lambert_transfer_id: i64) -> Self {
        Self {
            lambert_transfer_id,
            arrival_position_km: Vector3::zeros(),
            arrival_velocity_km_s: Vector3::zeros(),
            arrival_position_error_km: Vector3::zeros(),
            arrival_position_error_norm_km: 0.0,
            arrival_velocity_error_km_s: Vector3::zeros(),
            arrival_velocity_error_norm_km_s: 0.0,
            success: false,
        }
    }

    /// Builds a successful row from the predicted arrival state and the
    /// reference state it is compared against.
    pub fn from_states(
        lambert_transfer_id: i64,
        predicted_position_km: Vector3,
        predicted_velocity_km_s: Vector3,
        reference_position_km: Vector3,
        reference_velocity_km_s: Vector3,
    ) -> Self {
        let position_error = predicted_position_km - reference_position_km;
        let velocity_error = predicted_velocity_km_s - reference_velocity_km_s;
        Self {
            lambert_transfer_id,
            arrival_position_km: predicted_position_km,
            arrival_velocity_km_s: predicted_velocity_km_s,
            arrival_position_error_km: position_error,
            arrival_position_error_norm_km: position_error.norm(),
            arrival_velocity_error_km_s: velocity_error,
            arrival_velocity_error_norm_km_s: velocity_error.norm(),
            success: true,
        }
    }
}

pub struct ResultStore {
    conn: Connection,
}

impl ResultStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path).context(DatabaseSnafu)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().context(DatabaseSnafu)?;
        Ok(Self { conn })
    }

    fn table_exists(&self, table: &str) -> StoreResult<bool> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |row| row.get(0),
            )
            .context(DatabaseSnafu)?;
        Ok(count > 0)
    }

    fn row_count(&self, table: &str) -> StoreResult<i64> {
        self.conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })
            .context(DatabaseSnafu)
    }

    fn ensure_upstream(&self, table: &'static str) -> StoreResult<()> {
        if !self.table_exists(table)? || self.row_count(table)? == 0 {
            return Err(StoreError::MissingUpstreamTable { table });
        }
        Ok(())
    }

    /// Starts the single transaction a scan run writes under.
    pub fn begin(&self) -> StoreResult<()> {
        self.conn
            .execute_batch("BEGIN TRANSACTION")
            .context(DatabaseSnafu)
    }

    /// Commits the scan transaction. A transient failure is retried once.
    pub fn commit(&self) -> StoreResult<()> {
        if let Err(error) = self.conn.execute_batch("COMMIT") {
            warn!("commit failed ({error}), retrying once");
            return self.conn.execute_batch("COMMIT").context(DatabaseSnafu);
        }
        Ok(())
    }

    /// Drops and recreates the lambert table.
    pub fn recreate_lambert_table(&self) -> StoreResult<()> {
        self.conn
            .execute_batch(&format!(
                "DROP TABLE IF EXISTS {LAMBERT_TABLE};
                 CREATE TABLE {LAMBERT_TABLE} (
                    transfer_id                             INTEGER PRIMARY KEY AUTOINCREMENT,
                    departure_object_id                     INTEGER NOT NULL,
                    arrival_object_id                       INTEGER NOT NULL,
                    departure_epoch                         REAL NOT NULL,
                    time_of_flight                          REAL NOT NULL,
                    revolutions                             INTEGER NOT NULL,
                    prograde                                INTEGER NOT NULL,
                    departure_position_x                    REAL NOT NULL,
                    departure_position_y                    REAL NOT NULL,
                    departure_position_z                    REAL NOT NULL,
                    departure_velocity_x                    REAL NOT NULL,
                    departure_velocity_y                    REAL NOT NULL,
                    departure_velocity_z                    REAL NOT NULL,
                    departure_semi_major_axis               REAL NOT NULL,
                    departure_eccentricity                  REAL NOT NULL,
                    departure_inclination                   REAL NOT NULL,
                    departure_argument_of_periapsis         REAL NOT NULL,
                    departure_longitude_of_ascending_node   REAL NOT NULL,
                    departure_true_anomaly                  REAL NOT NULL,
                    arrival_position_x                      REAL NOT NULL,
                    arrival_position_y                      REAL NOT NULL,
                    arrival_position_z                      REAL NOT NULL,
                    arrival_velocity_x                      REAL NOT NULL,
                    arrival_velocity_y                      REAL NOT NULL,
                    arrival_velocity_z                      REAL NOT NULL,
                    arrival_semi_major_axis                 REAL NOT NULL,
                    arrival_eccentricity                    REAL NOT NULL,
                    arrival_inclination                     REAL NOT NULL,
                    arrival_argument_of_periapsis           REAL NOT NULL,
                    arrival_longitude_of_ascending_node     REAL NOT NULL,
                    arrival_true_anomaly                    REAL NOT NULL,
                    transfer_semi_major_axis                REAL NOT NULL,
                    transfer_eccentricity                   REAL NOT NULL,
                    transfer_inclination                    REAL NOT NULL,
                    transfer_argument_of_periapsis          REAL NOT NULL,
                    transfer_longitude_of_ascending_node    REAL NOT NULL,
                    transfer_true_anomaly                   REAL NOT NULL,
                    departure_delta_v_x                     REAL NOT NULL,
                    departure_delta_v_y                     REAL NOT NULL,
                    departure_delta_v_z                     REAL NOT NULL,
                    arrival_delta_v_x                       REAL NOT NULL,
                    arrival_delta_v_y                       REAL NOT NULL,
                    arrival_delta_v_z                       REAL NOT NULL,
                    transfer_delta_v                        REAL NOT NULL
                 );"
            ))
            .context(DatabaseSnafu)
    }

    /// Drops and recreates an arrival-miss table. The lambert table must
    /// already be populated for the SGP4 scan; the SGP4 table for the J2
    /// analysis.
    pub fn recreate_miss_table(&self, table: &'static str) -> StoreResult<()> {
        match table {
            SGP4_TABLE => self.ensure_upstream(LAMBERT_TABLE)?,
            J2_TABLE => {
                self.ensure_upstream(LAMBERT_TABLE)?;
                self.ensure_upstream(SGP4_TABLE)?;
            }
            _ => unreachable!("unknown miss table"),
        }

        self.conn
            .execute_batch(&format!(
                "DROP TABLE IF EXISTS {table};
                 CREATE TABLE {table} (
                    transfer_id                 INTEGER PRIMARY KEY AUTOINCREMENT,
                    lambert_transfer_id         INTEGER NOT NULL,
                    arrival_position_x          REAL NOT NULL,
                    arrival_position_y          REAL NOT NULL,
                    arrival_position_z          REAL NOT NULL,
                    arrival_velocity_x          REAL NOT NULL,
                    arrival_velocity_y          REAL NOT NULL,
                    arrival_velocity_z          REAL NOT NULL,
                    arrival_position_x_error    REAL NOT NULL,
                    arrival_position_y_error    REAL NOT NULL,
                    arrival_position_z_error    REAL NOT NULL,
                    arrival_position_error      REAL NOT NULL,
                    arrival_velocity_x_error    REAL NOT NULL,
                    arrival_velocity_y_error    REAL NOT NULL,
                    arrival_velocity_z_error    REAL NOT NULL,
                    arrival_velocity_error      REAL NOT NULL,
                    success                     INTEGER NOT NULL
                 );
                 CREATE INDEX IF NOT EXISTS arrival_position_error
                    ON {table} (arrival_position_error ASC);
                 CREATE INDEX IF NOT EXISTS arrival_velocity_error
                    ON {table} (arrival_velocity_error ASC);"
            ))
            .context(DatabaseSnafu)
    }

    /// Index supporting the shortlist-by-ranked-query, created after the scan
    /// finishes inserting.
    pub fn create_transfer_delta_v_index(&self) -> StoreResult<()> {
        self.conn
            .execute_batch(&format!(
                "CREATE INDEX IF NOT EXISTS transfer_delta_v
                    ON {LAMBERT_TABLE} (transfer_delta_v ASC);"
            ))
            .context(DatabaseSnafu)
    }

    pub fn insert_lambert(&self, record: &LambertTransferRecord) -> StoreResult<i64> {
        let mut statement = self
            .conn
            .prepare_cached(&format!(
                "INSERT INTO {LAMBERT_TABLE} VALUES (NULL, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9,
                    ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24,
                    ?25, ?26, ?27, ?28, ?29, ?30, ?31, ?32, ?33, ?34, ?35, ?36, ?37, ?38, ?39,
                    ?40, ?41, ?42, ?43)"
            ))
            .context(DatabaseSnafu)?;
        statement
            .execute(params![
                record.departure_object_id as i64,
                record.arrival_object_id as i64,
                record.departure_epoch_jd,
                record.time_of_flight_s,
                record.revolutions as i64,
                record.prograde,
                record.departure_position_km[0],
                record.departure_position_km[1],
                record.departure_position_km[2],
                record.departure_velocity_km_s[0],
                record.departure_velocity_km_s[1],
                record.departure_velocity_km_s[2],
                record.departure_elements.sma_km,
                record.departure_elements.ecc,
                record.departure_elements.inc_rad,
                record.departure_elements.aop_rad,
                record.departure_elements.raan_rad,
                record.departure_elements.true_anomaly_rad,
                record.arrival_position_km[0],
                record.arrival_position_km[1],
                record.arrival_position_km[2],
                record.arrival_velocity_km_s[0],
                record.arrival_velocity_km_s[1],
                record.arrival_velocity_km_s[2],
                record.arrival_elements.sma_km,
                record.arrival_elements.ecc,
                record.arrival_elements.inc_rad,
                record.arrival_elements.aop_rad,
                record.arrival_elements.raan_rad,
                record.arrival_elements.true_anomaly_rad,
                record.transfer_elements.sma_km,
                record.transfer_elements.ecc,
                record.transfer_elements.inc_rad,
                record.transfer_elements.aop_rad,
                record.transfer_elements.raan_rad,
                record.transfer_elements.true_anomaly_rad,
                record.departure_delta_v_km_s[0],
                record.departure_delta_v_km_s[1],
                record.departure_delta_v_km_s[2],
                record.arrival_delta_v_km_s[0],
                record.arrival_delta_v_km_s[1],
                record.arrival_delta_v_km_s[2],
                record.transfer_delta_v_km_s,
            ])
            .context(DatabaseSnafu)?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_miss(&self, table: &str, record: &PropagationRecord) -> StoreResult<()> {
        let mut statement = self
            .conn
            .prepare_cached(&format!(
                "INSERT INTO {table} VALUES (NULL, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                    ?11, ?12, ?13, ?14, ?15, ?16)"
            ))
            .context(DatabaseSnafu)?;
        statement
            .execute(params![
                record.lambert_transfer_id,
                record.arrival_position_km[0],
                record.arrival_position_km[1],
                record.arrival_position_km[2],
                record.arrival_velocity_km_s[0],
                record.arrival_velocity_km_s[1],
                record.arrival_velocity_km_s[2],
                record.arrival_position_error_km[0],
                record.arrival_position_error_km[1],
                record.arrival_position_error_km[2],
                record.arrival_position_error_norm_km,
                record.arrival_velocity_error_km_s[0],
                record.arrival_velocity_error_km_s[1],
                record.arrival_velocity_error_km_s[2],
                record.arrival_velocity_error_norm_km_s,
                record.success,
            ])
            .context(DatabaseSnafu)?;
        Ok(())
    }

    pub fn lambert_count(&self) -> StoreResult<i64> {
        self.row_count(LAMBERT_TABLE)
    }

    pub fn miss_count(&self, table: &str) -> StoreResult<i64> {
        self.row_count(table)
    }

    pub fn lambert_count_below(&self, delta_v_cutoff_km_s: f64) -> StoreResult<i64> {
        self.conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {LAMBERT_TABLE} WHERE transfer_delta_v <= ?1"),
                params![delta_v_cutoff_km_s],
                |row| row.get(0),
            )
            .context(DatabaseSnafu)
    }

    /// All lambert rows, in transfer_id order.
    pub fn lambert_transfers(&self) -> StoreResult<Vec<StoredLambertTransfer>> {
        self.select_lambert(&format!(
            "SELECT * FROM {LAMBERT_TABLE} ORDER BY transfer_id ASC"
        ))
    }

    /// The lambert rows whose SGP4 re-propagation succeeded, in transfer_id
    /// order.
    pub fn sgp4_successful_transfers(&self) -> StoreResult<Vec<StoredLambertTransfer>> {
        self.ensure_upstream(SGP4_TABLE)?;
        self.select_lambert(&format!(
            "SELECT {LAMBERT_TABLE}.* FROM {LAMBERT_TABLE}
                INNER JOIN {SGP4_TABLE}
                ON {SGP4_TABLE}.lambert_transfer_id = {LAMBERT_TABLE}.transfer_id
                AND {SGP4_TABLE}.success = 1
                ORDER BY {LAMBERT_TABLE}.transfer_id ASC"
        ))
    }

    /// Fetches one lambert row by id.
    pub fn lambert_transfer(&self, transfer_id: i64) -> StoreResult<Option<StoredLambertTransfer>> {
        let mut rows = self.select_lambert(&format!(
            "SELECT * FROM {LAMBERT_TABLE} WHERE transfer_id = {transfer_id}"
        ))?;
        Ok(rows.pop())
    }

    fn select_lambert(&self, sql: &str) -> StoreResult<Vec<StoredLambertTransfer>> {
        let mut statement = self.conn.prepare(sql).context(DatabaseSnafu)?;
        let rows = statement
            .query_map([], |row| {
                Ok(StoredLambertTransfer {
                    transfer_id: row.get(0)?,
                    record: LambertTransferRecord {
                        departure_object_id: row.get::<_, i64>(1)? as u64,
                        arrival_object_id: row.get::<_, i64>(2)? as u64,
                        departure_epoch_jd: row.get(3)?,
                        time_of_flight_s: row.get(4)?,
                        revolutions: row.get::<_, i64>(5)? as u32,
                        prograde: row.get(6)?,
                        departure_position_km: Vector3::new(
                            row.get(7)?,
                            row.get(8)?,
                            row.get(9)?,
                        ),
                        departure_velocity_km_s: Vector3::new(
                            row.get(10)?,
                            row.get(11)?,
                            row.get(12)?,
                        ),
                        departure_elements: elements_from_row(row, 13)?,
                        arrival_position_km: Vector3::new(
                            row.get(19)?,
                            row.get(20)?,
                            row.get(21)?,
                        ),
                        arrival_velocity_km_s: Vector3::new(
                            row.get(22)?,
                            row.get(23)?,
                            row.get(24)?,
                        ),
                        arrival_elements: elements_from_row(row, 25)?,
                        transfer_elements: elements_from_row(row, 31)?,
                        departure_delta_v_km_s: Vector3::new(
                            row.get(37)?,
                            row.get(38)?,
                            row.get(39)?,
                        ),
                        arrival_delta_v_km_s: Vector3::new(
                            row.get(40)?,
                            row.get(41)?,
                            row.get(42)?,
                        ),
                        transfer_delta_v_km_s: row.get(43)?,
                    },
                })
            })
            .context(DatabaseSnafu)?;
        rows.collect::<Result<Vec<_>, _>>().context(DatabaseSnafu)
    }

    /// Fetches the arrival-miss row keyed by a lambert transfer.
    pub fn miss_record(
        &self,
        table: &str,
        lambert_transfer_id: i64,
    ) -> StoreResult<Option<PropagationRecord>> {
        let mut statement = self
            .conn
            .prepare(&format!(
                "SELECT * FROM {table} WHERE lambert_transfer_id = ?1"
            ))
            .context(DatabaseSnafu)?;
        let rows = statement
            .query_map(params![lambert_transfer_id], |row| {
                Ok(PropagationRecord {
                    lambert_transfer_id: row.get(1)?,
                    arrival_position_km: Vector3::new(row.get(2)?, row.get(3)?, row.get(4)?),
                    arrival_velocity_km_s: Vector3::new(row.get(5)?, row.get(6)?, row.get(7)?),
                    arrival_position_error_km: Vector3::new(
                        row.get(8)?,
                        row.get(9)?,
                        row.get(10)?,
                    ),
                    arrival_position_error_norm_km: row.get(11)?,
                    arrival_velocity_error_km_s: Vector3::new(
                        row.get(12)?,
                        row.get(13)?,
                        row.get(14)?,
                    ),
                    arrival_velocity_error_norm_km_s: row.get(15)?,
                    success: row.get(16)?,
                })
            })
            .context(DatabaseSnafu)?;
        let mut records = rows
            .collect::<Result<Vec<_>, _>>()
            .context(DatabaseSnafu)?;
        Ok(records.pop())
    }

    /// Writes the top-N lambert rows by ascending total delta-v as CSV.
    pub fn write_lambert_shortlist(&self, length: usize, path: &str) -> StoreResult<()> {
        let mut writer = csv::Writer::from_path(path).context(ShortlistIoSnafu { path })?;
        writer
            .write_record(LAMBERT_SHORTLIST_HEADER)
            .context(ShortlistIoSnafu { path })?;

        let transfers = self.select_lambert(&format!(
            "SELECT * FROM {LAMBERT_TABLE} ORDER BY transfer_delta_v ASC LIMIT {length}"
        ))?;
        for transfer in &transfers {
            let r = &transfer.record;
            writer
                .write_record(
                    [
                        transfer.transfer_id.to_string(),
                        r.departure_object_id.to_string(),
                        r.arrival_object_id.to_string(),
                        r.departure_epoch_jd.to_string(),
                        r.time_of_flight_s.to_string(),
                        r.revolutions.to_string(),
                        (r.prograde as i64).to_string(),
                        r.departure_position_km[0].to_string(),
                        r.departure_position_km[1].to_string(),
                        r.departure_position_km[2].to_string(),
                        r.departure_velocity_km_s[0].to_string(),
                        r.departure_velocity_km_s[1].to_string(),
                        r.departure_velocity_km_s[2].to_string(),
                        r.departure_elements.sma_km.to_string(),
                        r.departure_elements.ecc.to_string(),
                        r.departure_elements.inc_rad.to_string(),
                        r.departure_elements.aop_rad.to_string(),
                        r.departure_elements.raan_rad.to_string(),
                        r.departure_elements.true_anomaly_rad.to_string(),
                        r.arrival_position_km[0].to_string(),
                        r.arrival_position_km[1].to_string(),
                        r.arrival_position_km[2].to_string(),
                        r.arrival_velocity_km_s[0].to_string(),
                        r.arrival_velocity_km_s[1].to_string(),
                        r.arrival_velocity_km_s[2].to_string(),
                        r.arrival_elements.sma_km.to_string(),
                        r.arrival_elements.ecc.to_string(),
                        r.arrival_elements.inc_rad.to_string(),
                        r.arrival_elements.aop_rad.to_string(),
                        r.arrival_elements.raan_rad.to_string(),
                        r.arrival_elements.true_anomaly_rad.to_string(),
                        r.transfer_elements.sma_km.to_string(),
                        r.transfer_elements.ecc.to_string(),
                        r.transfer_elements.inc_rad.to_string(),
                        r.transfer_elements.aop_rad.to_string(),
                        r.transfer_elements.raan_rad.to_string(),
                        r.transfer_elements.true_anomaly_rad.to_string(),
                        r.departure_delta_v_km_s[0].to_string(),
                        r.departure_delta_v_km_s[1].to_string(),
                        r.departure_delta_v_km_s[2].to_string(),
                        r.arrival_delta_v_km_s[0].to_string(),
                        r.arrival_delta_v_km_s[1].to_string(),
                        r.arrival_delta_v_km_s[2].to_string(),
                        r.transfer_delta_v_km_s.to_string(),
                    ]
                    .iter(),
                )
                .context(ShortlistIoSnafu { path })?;
        }
        writer.flush().map_err(|error| StoreError::ShortlistIo {
            path: path.to_string(),
            source: error.into(),
        })
    }

    /// Writes the top-N arrival-miss rows, ranked by the upstream total
    /// delta-v, joined with their lambert context.
    pub fn write_miss_shortlist(
        &self,
        table: &str,
        length: usize,
        path: &str,
    ) -> StoreResult<()> {
        let mut writer = csv::Writer::from_path(path).context(ShortlistIoSnafu { path })?;
        writer
            .write_record(MISS_SHORTLIST_HEADER)
            .context(ShortlistIoSnafu { path })?;

        let sql = format!(
            "SELECT {table}.transfer_id, {table}.lambert_transfer_id,
                    {LAMBERT_TABLE}.transfer_delta_v,
                    {LAMBERT_TABLE}.departure_object_id, {LAMBERT_TABLE}.arrival_object_id,
                    {table}.arrival_position_x, {table}.arrival_position_y,
                    {table}.arrival_position_z, {table}.arrival_velocity_x,
                    {table}.arrival_velocity_y, {table}.arrival_velocity_z,
                    {table}.arrival_position_x_error, {table}.arrival_position_y_error,
                    {table}.arrival_position_z_error, {table}.arrival_position_error,
                    {table}.arrival_velocity_x_error, {table}.arrival_velocity_y_error,
                    {table}.arrival_velocity_z_error, {table}.arrival_velocity_error
             FROM {table}
             INNER JOIN {LAMBERT_TABLE}
             ON {LAMBERT_TABLE}.transfer_id = {table}.lambert_transfer_id
             ORDER BY {LAMBERT_TABLE}.transfer_delta_v ASC LIMIT {length}"
        );
        let mut statement = self.conn.prepare(&sql).context(DatabaseSnafu)?;
        let rows = statement
            .query_map([], |row| {
                let mut fields = Vec::with_capacity(19);
                for i in 0..2 {
                    fields.push(row.get::<_, i64>(i)?.to_string());
                }
                fields.push(row.get::<_, f64>(2)?.to_string());
                for i in 3..5 {
                    fields.push(row.get::<_, i64>(i)?.to_string());
                }
                for i in 5..19 {
                    fields.push(row.get::<_, f64>(i)?.to_string());
                }
                Ok(fields)
            })
            .context(DatabaseSnafu)?;
        for fields in rows {
            let fields = fields.context(DatabaseSnafu)?;
            writer
                .write_record(fields.iter())
                .context(ShortlistIoSnafu { path })?;
        }
        writer.flush().map_err(|error| StoreError::ShortlistIo {
            path: path.to_string(),
            source: error.into(),
        })
    }
}

fn elements_from_row(row: &rusqlite::Row, offset: usize) -> rusqlite::Result<KeplerianElements> {
    Ok(KeplerianElements {
        sma_km: row.get(offset)?,
        ecc: row.get(offset + 1)?,
        inc_rad: row.get(offset + 2)?,
        aop_rad: row.get(offset + 3)?,
        raan_rad: row.get(offset + 4)?,
        true_anomaly_rad: row.get(offset + 5)?,
    })
}

const LAMBERT_SHORTLIST_HEADER: [&str; 44] = [
    "transfer_id",
    "departure_object_id",
    "arrival_object_id",
    "departure_epoch",
    "time_of_flight",
    "revolutions",
    "prograde",
    "departure_position_x",
    "departure_position_y",
    "departure_position_z",
    "departure_velocity_x",
    "departure_velocity_y",
    "departure_velocity_z",
    "departure_semi_major_axis",
    "departure_eccentricity",
    "departure_inclination",
    "departure_argument_of_periapsis",
    "departure_longitude_of_ascending_node",
    "departure_true_anomaly",
    "arrival_position_x",
    "arrival_position_y",
    "arrival_position_z",
    "arrival_velocity_x",
    "arrival_velocity_y",
    "arrival_velocity_z",
    "arrival_semi_major_axis",
    "arrival_eccentricity",
    "arrival_inclination",
    "arrival_argument_of_periapsis",
    "arrival_longitude_of_ascending_node",
    "arrival_true_anomaly",
    "transfer_semi_major_axis",
    "transfer_eccentricity",
    "transfer_inclination",
    "transfer_argument_of_periapsis",
    "transfer_longitude_of_ascending_node",
    "transfer_true_anomaly",
    "departure_delta_v_x",
    "departure_delta_v_y",
    "departure_delta_v_z",
    "arrival_delta_v_x",
    "arrival_delta_v_y",
    "arrival_delta_v_z",
    "transfer_delta_v",
];

const MISS_SHORTLIST_HEADER: [&str; 19] = [
    "transfer_id",
    "lambert_transfer_id",
    "transfer_delta_v",
    "departure_object_id",
    "arrival_object_id",
    "arrival_position_x",
    "arrival_position_y",
    "arrival_position_z",
    "arrival_velocity_x",
    "arrival_velocity_y",
    "arrival_velocity_z",
    "arrival_position_x_error",
    "arrival_position_y_error",
    "arrival_position_z_error",
    "arrival_position_error",
    "arrival_velocity_x_error",
    "arrival_velocity_y_error",
    "arrival_velocity_z_error",
    "arrival_velocity_error",
];

#[cfg(test)]
mod ut_store {
    use super::*;

    fn sample_elements() -> KeplerianElements {
        KeplerianElements {
            sma_km: 7000.0,
            ecc: 0.01,
            inc_rad: 1.7,
            raan_rad: 0.4,
            aop_rad: 2.1,
            true_anomaly_rad: 3.0,
        }
    }

    fn sample_record(delta_v: f64) -> LambertTransferRecord {
        LambertTransferRecord {
            departure_object_id: 25544,
            arrival_object_id: 8195,
            departure_epoch_jd: 2457105.5,
            time_of_flight_s: 36000.0,
            revolutions: 1,
            prograde: true,
            departure_position_km: Vector3::new(1.0, 2.0, 3.0),
            departure_velocity_km_s: Vector3::new(4.0, 5.0, 6.0),
            departure_elements: sample_elements(),
            arrival_position_km: Vector3::new(7.0, 8.0, 9.0),
            arrival_velocity_km_s: Vector3::new(10.0, 11.0, 12.0),
            arrival_elements: sample_elements(),
            transfer_elements: sample_elements(),
            departure_delta_v_km_s: Vector3::new(0.1, 0.2, 0.3),
            arrival_delta_v_km_s: Vector3::new(0.4, 0.5, 0.6),
            transfer_delta_v_km_s: delta_v,
        }
    }

    #[test]
    fn test_insert_and_read_back() {
        let store = ResultStore::open_in_memory().unwrap();
        store.recreate_lambert_table().unwrap();

        let record = sample_record(1.5);
        let id = store.insert_lambert(&record).unwrap();
        assert_eq!(id, 1);

        let rows = store.lambert_transfers().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].transfer_id, 1);
        assert_eq!(rows[0].record, record);
    }

    #[test]
    fn test_transfer_ids_are_monotonic() {
        let store = ResultStore::open_in_memory().unwrap();
        store.recreate_lambert_table().unwrap();
        for i in 0..5 {
            let id = store.insert_lambert(&sample_record(i as f64)).unwrap();
            assert_eq!(id, i + 1);
        }
    }

    #[test]
    fn test_schema_recreation_is_idempotent() {
        let store = ResultStore::open_in_memory().unwrap();
        store.recreate_lambert_table().unwrap();
        store.insert_lambert(&sample_record(1.0)).unwrap();
        store.recreate_miss_table(SGP4_TABLE).unwrap();
        store
            .insert_miss(SGP4_TABLE, &PropagationRecord::failed(1))
            .unwrap();

        // Recreating drops the previous contents.
        store.recreate_miss_table(SGP4_TABLE).unwrap();
        assert_eq!(store.miss_count(SGP4_TABLE).unwrap(), 0);
    }

    #[test]
    fn test_missing_upstream_table() {
        let store = ResultStore::open_in_memory().unwrap();
        assert!(matches!(
            store.recreate_miss_table(SGP4_TABLE),
            Err(StoreError::MissingUpstreamTable { .. })
        ));

        // An empty lambert table is as missing as no table.
        store.recreate_lambert_table().unwrap();
        assert!(matches!(
            store.recreate_miss_table(SGP4_TABLE),
            Err(StoreError::MissingUpstreamTable { .. })
        ));

        store.insert_lambert(&sample_record(1.0)).unwrap();
        assert!(store.recreate_miss_table(SGP4_TABLE).is_ok());
    }

    #[test]
    fn test_success_join() {
        let store = ResultStore::open_in_memory().unwrap();
        store.recreate_lambert_table().unwrap();
        let id1 = store.insert_lambert(&sample_record(1.0)).unwrap();
        let id2 = store.insert_lambert(&sample_record(2.0)).unwrap();
        store.recreate_miss_table(SGP4_TABLE).unwrap();
        store
            .insert_miss(SGP4_TABLE, &PropagationRecord::failed(id1))
            .unwrap();
        store
            .insert_miss(
                SGP4_TABLE,
                &PropagationRecord::from_states(
                    id2,
                    Vector3::new(1.0, 0.0, 0.0),
                    Vector3::new(0.0, 1.0, 0.0),
                    Vector3::zeros(),
                    Vector3::zeros(),
                ),
            )
            .unwrap();

        let successful = store.sgp4_successful_transfers().unwrap();
        assert_eq!(successful.len(), 1);
        assert_eq!(successful[0].transfer_id, id2);
    }

    #[test]
    fn test_shortlist_ranked_ascending() {
        let store = ResultStore::open_in_memory().unwrap();
        store.recreate_lambert_table().unwrap();
        for delta_v in [3.0, 1.0, 2.0] {
            store.insert_lambert(&sample_record(delta_v)).unwrap();
        }
        store.create_transfer_delta_v_index().unwrap();

        let dir = std::env::temp_dir().join("kessler_store_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("shortlist.csv");
        let path_str = path.to_str().unwrap();
        store.write_lambert_shortlist(2, path_str).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("transfer_id,departure_object_id"));
        // Ranked ascending by total delta-v: ids 2 (1.0) then 3 (2.0).
        assert!(lines[1].starts_with("2,"));
        assert!(lines[2].starts_with("3,"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_error_norm_consistency() {
        let record = PropagationRecord::from_states(
            7,
            Vector3::new(3.0, 4.0, 0.0),
            Vector3::new(0.0, 0.1, 0.0),
            Vector3::zeros(),
            Vector3::zeros(),
        );
        assert!((record.arrival_position_error_norm_km - 5.0).abs() < 1e-12);
        assert!((record.arrival_velocity_error_norm_km_s - 0.1).abs() < 1e-12);
    }
}
