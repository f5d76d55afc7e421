use std::collections::BTreeSet;

use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::file_record::FileRecord;
use crate::models::location::Location;
use crate::models::search::{FileOrder, LocationOrder, OrderDirection, SearchCriteria};

const FILE_COLUMNS: &str = "id, absolute_path, relative_path, location_id, width, height, size, \
     date_added, date_modified, tags, thumbnail_path, is_broken";

pub fn insert_location(conn: &Connection, location: &Location) -> Result<(), AppError> {
    conn.execute(
        "INSERT INTO locations (id, path, date_added, tags_to_add) VALUES (?1, ?2, ?3, ?4)",
        params![
            location.id.to_string(),
            location.path,
            location.date_added,
            serde_json::to_string(&location.tags_to_add)?,
        ],
    )?;
    Ok(())
}

pub fn update_location(conn: &Connection, location: &Location) -> Result<usize, AppError> {
    let count = conn.execute(
        "UPDATE locations SET path = ?2, date_added = ?3, tags_to_add = ?4 WHERE id = ?1",
        params![
            location.id.to_string(),
            location.path,
            location.date_added,
            serde_json::to_string(&location.tags_to_add)?,
        ],
    )?;
    Ok(count)
}

pub fn delete_location(conn: &Connection, id: Uuid) -> Result<usize, AppError> {
    let count = conn.execute(
        "DELETE FROM locations WHERE id = ?1",
        params![id.to_string()],
    )?;
    Ok(count)
}

pub fn list_locations(
    conn: &Connection,
    order_by: LocationOrder,
    order: OrderDirection,
) -> Result<Vec<Location>, AppError> {
    let sql = format!(
        "SELECT id, path, date_added, tags_to_add FROM locations ORDER BY {} {order}",
        order_by.column()
    );
    let mut stmt = conn.prepare(&sql)?;
    let locations = stmt
        .query_map([], location_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(locations)
}

/// Inserts `record` unless its id or absolute path is already catalogued.
/// Returns whether a row was written.
pub fn insert_file_if_absent(conn: &Connection, record: &FileRecord) -> Result<bool, AppError> {
    let count = conn.execute(
        &format!(
            "INSERT OR IGNORE INTO files ({FILE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
        ),
        params![
            record.id.to_string(),
            record.absolute_path,
            record.relative_path,
            record.location_id.to_string(),
            record.width,
            record.height,
            record.size as i64,
            record.date_added,
            record.date_modified,
            serde_json::to_string(&record.tags)?,
            record.thumbnail_path,
            record.is_broken,
        ],
    )?;
    Ok(count > 0)
}

pub fn upsert_file(conn: &Connection, record: &FileRecord) -> Result<(), AppError> {
    conn.execute(
        &format!(
            "INSERT INTO files ({FILE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(id) DO UPDATE SET
                absolute_path = excluded.absolute_path,
                relative_path = excluded.relative_path,
                location_id = excluded.location_id,
                width = excluded.width,
                height = excluded.height,
                size = excluded.size,
                date_added = excluded.date_added,
                date_modified = excluded.date_modified,
                tags = excluded.tags,
                thumbnail_path = excluded.thumbnail_path,
                is_broken = excluded.is_broken"
        ),
        params![
            record.id.to_string(),
            record.absolute_path,
            record.relative_path,
            record.location_id.to_string(),
            record.width,
            record.height,
            record.size as i64,
            record.date_added,
            record.date_modified,
            serde_json::to_string(&record.tags)?,
            record.thumbnail_path,
            record.is_broken,
        ],
    )?;
    Ok(())
}

pub fn search_files(
    conn: &Connection,
    criteria: &SearchCriteria,
    order_by: FileOrder,
    order: OrderDirection,
) -> Result<Vec<FileRecord>, AppError> {
    let order_clause = format!("ORDER BY {} {order}", order_by.column());
    let records = match criteria {
        SearchCriteria::All => {
            let mut stmt =
                conn.prepare(&format!("SELECT {FILE_COLUMNS} FROM files {order_clause}"))?;
            let records = stmt
                .query_map([], file_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            records
        }
        SearchCriteria::LocationEquals(location_id) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {FILE_COLUMNS} FROM files WHERE location_id = ?1 {order_clause}"
            ))?;
            let records = stmt
                .query_map(params![location_id.to_string()], file_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            records
        }
    };
    Ok(records)
}

pub fn delete_files(conn: &Connection, ids: &[Uuid]) -> Result<usize, AppError> {
    let mut stmt = conn.prepare("DELETE FROM files WHERE id = ?1")?;
    let mut count = 0;
    for id in ids {
        count += stmt.execute(params![id.to_string()])?;
    }
    Ok(count)
}

fn parse_uuid(idx: usize, raw: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_tags(idx: usize, raw: &str) -> rusqlite::Result<BTreeSet<Uuid>> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn location_from_row(row: &Row<'_>) -> rusqlite::Result<Location> {
    let id: String = row.get(0)?;
    let tags: String = row.get(3)?;
    Ok(Location {
        id: parse_uuid(0, &id)?,
        path: row.get(1)?,
        date_added: row.get(2)?,
        tags_to_add: parse_tags(3, &tags)?,
        is_broken: false,
    })
}

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let id: String = row.get(0)?;
    let location_id: String = row.get(3)?;
    let size: i64 = row.get(6)?;
    let tags: String = row.get(9)?;
    Ok(FileRecord {
        id: parse_uuid(0, &id)?,
        absolute_path: row.get(1)?,
        relative_path: row.get(2)?,
        location_id: parse_uuid(3, &location_id)?,
        width: row.get(4)?,
        height: row.get(5)?,
        size: size.max(0) as u64,
        date_added: row.get(7)?,
        date_modified: row.get(8)?,
        tags: parse_tags(9, &tags)?,
        thumbnail_path: row.get(10)?,
        is_broken: row.get(11)?,
    })
}
