//! Persisted record layout.
//!
//! The engine owns the on-disk format. The core only relies on one row per
//! resource and one row per unit, with the columns named here.

use crate::error::{CoreError, CoreResult};
use crate::types::{RequesterId, ResourceId, UnitId};
use reservo_executor::{Row, Statement, Value};
use std::fmt;

/// Table holding one row per resource.
pub const RESOURCES: &str = "resources";
/// Table holding one row per unit.
pub const UNITS: &str = "units";

/// `resources.total_units`
pub const TOTAL_UNITS: &str = "total_units";
/// `resources.available_units`
pub const AVAILABLE_UNITS: &str = "available_units";
/// `units.resource_id`
pub const RESOURCE_ID: &str = "resource_id";
/// `units.status`
pub const STATUS: &str = "status";
/// `units.holder_id`
pub const HOLDER_ID: &str = "holder_id";

/// Columns of the resources table, followed by `extra_columns`.
///
/// Extra columns carry things the core never reads, such as a tenant column
/// used with [`reservo_executor::ScopedConnector`].
#[must_use]
pub fn resource_columns<'a>(extra_columns: &[&'a str]) -> Vec<&'a str> {
    let mut columns = vec![TOTAL_UNITS, AVAILABLE_UNITS];
    columns.extend_from_slice(extra_columns);
    columns
}

/// Columns of the units table, followed by `extra_columns`.
#[must_use]
pub fn unit_columns<'a>(extra_columns: &[&'a str]) -> Vec<&'a str> {
    let mut columns = vec![RESOURCE_ID, STATUS, HOLDER_ID];
    columns.extend_from_slice(extra_columns);
    columns
}

/// Allocation status of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitStatus {
    /// Available for reservation.
    Free,
    /// Reserved by a holder.
    Held,
}

impl UnitStatus {
    /// Stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Held => "held",
        }
    }

    fn parse(value: &str) -> CoreResult<Self> {
        match value {
            "free" => Ok(Self::Free),
            "held" => Ok(Self::Held),
            other => Err(CoreError::invalid_record(format!(
                "unknown unit status {other:?}"
            ))),
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn count_column(row: &Row, column: &str) -> CoreResult<u32> {
    let raw = row
        .int(column)
        .ok_or_else(|| CoreError::invalid_record(format!("{column} is missing")))?;
    u32::try_from(raw).map_err(|_| CoreError::invalid_record(format!("{column} = {raw} is out of range")))
}

fn id_column(row: &Row) -> CoreResult<&str> {
    row.id()
        .ok_or_else(|| CoreError::invalid_record("row has no id"))
}

/// A resource row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    /// Resource identifier.
    pub id: ResourceId,
    /// Pool size, fixed at creation.
    pub total_units: u32,
    /// Units not currently held.
    pub available_units: u32,
}

impl ResourceRecord {
    /// Parses and validates a stored row.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRecord` if a column is missing or
    /// `available_units > total_units`.
    pub fn from_row(row: &Row) -> CoreResult<Self> {
        let record = Self {
            id: ResourceId::new(id_column(row)?),
            total_units: count_column(row, TOTAL_UNITS)?,
            available_units: count_column(row, AVAILABLE_UNITS)?,
        };
        if record.available_units > record.total_units {
            return Err(CoreError::invalid_record(format!(
                "resource {} has {} available of {} total",
                record.id, record.available_units, record.total_units
            )));
        }
        Ok(record)
    }
}

/// A unit row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitRecord {
    /// Unit identifier.
    pub id: UnitId,
    /// Owning resource.
    pub resource_id: ResourceId,
    /// Allocation status.
    pub status: UnitStatus,
    /// Present iff `status` is `Held`.
    pub holder: Option<RequesterId>,
}

impl UnitRecord {
    /// Parses and validates a stored row.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRecord` if a column is missing or the holder does not
    /// agree with the status.
    pub fn from_row(row: &Row) -> CoreResult<Self> {
        let id = UnitId::new(id_column(row)?);
        let resource_id = row
            .text(RESOURCE_ID)
            .map(ResourceId::new)
            .ok_or_else(|| CoreError::invalid_record(format!("unit {id} has no resource")))?;
        let status = UnitStatus::parse(row.text(STATUS).unwrap_or_default())?;
        let holder = row
            .text(HOLDER_ID)
            .filter(|h| !h.is_empty())
            .map(RequesterId::new);

        if holder.is_some() != (status == UnitStatus::Held) {
            return Err(CoreError::invalid_record(format!(
                "unit {id} is {status} but holder is {holder:?}"
            )));
        }
        Ok(Self {
            id,
            resource_id,
            status,
            holder,
        })
    }

    /// Returns true if the unit can be reserved.
    #[must_use]
    pub fn is_free(&self) -> bool {
        self.status == UnitStatus::Free
    }
}

fn count(n: u32) -> Value {
    Value::Int(i64::from(n))
}

pub(crate) fn insert_resource(id: &ResourceId, total_units: u32) -> Statement {
    Statement::insert(
        RESOURCES,
        id.as_str(),
        [(TOTAL_UNITS, count(total_units)), (AVAILABLE_UNITS, count(total_units))],
    )
}

pub(crate) fn insert_unit(id: &UnitId, resource: &ResourceId) -> Statement {
    Statement::insert(
        UNITS,
        id.as_str(),
        [
            (RESOURCE_ID, Value::text(resource.as_str())),
            (STATUS, Value::text(UnitStatus::Free.as_str())),
            (HOLDER_ID, Value::Null),
        ],
    )
}

pub(crate) fn select_resource(id: &ResourceId) -> Statement {
    Statement::get(RESOURCES, id.as_str())
}

pub(crate) fn select_unit(id: &UnitId) -> Statement {
    Statement::get(UNITS, id.as_str())
}

pub(crate) fn first_free_unit(resource: &ResourceId) -> Statement {
    Statement::scan(UNITS)
        .filter(RESOURCE_ID, resource.as_str())
        .filter(STATUS, UnitStatus::Free.as_str())
        .limit(1)
}

/// Compare-and-set on `available_units`.
pub(crate) fn set_available(id: &ResourceId, expected: u32, new: u32) -> Statement {
    Statement::update(RESOURCES, id.as_str(), [(AVAILABLE_UNITS, count(new))])
        .filter(AVAILABLE_UNITS, count(expected))
}

/// Marks a free unit held. Affects no row if the unit is not free.
pub(crate) fn hold_unit(id: &UnitId, holder: &RequesterId) -> Statement {
    Statement::update(
        UNITS,
        id.as_str(),
        [
            (STATUS, Value::text(UnitStatus::Held.as_str())),
            (HOLDER_ID, Value::text(holder.as_str())),
        ],
    )
    .filter(STATUS, UnitStatus::Free.as_str())
}

/// Marks a held unit free. Affects no row if the unit is not held.
pub(crate) fn free_unit(id: &UnitId) -> Statement {
    Statement::update(
        UNITS,
        id.as_str(),
        [
            (STATUS, Value::text(UnitStatus::Free.as_str())),
            (HOLDER_ID, Value::Null),
        ],
    )
    .filter(STATUS, UnitStatus::Held.as_str())
}
