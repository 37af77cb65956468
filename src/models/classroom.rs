use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Classroom {
    pub id: String,
    #[serde(rename = "classId")]
    pub class_id: String,
    #[serde(rename = "deviceId")]
    pub device_id: String,
    pub capacity: i64,
    pub occupancy: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateClassroomRequest {
    #[serde(rename = "classId")]
    pub class_id: String,
    #[serde(rename = "deviceId")]
    pub device_id: String,
    pub capacity: i64,
    #[serde(default)]
    pub occupancy: i64,
}

impl CreateClassroomRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        require_non_empty("classId", &self.class_id)?;
        require_non_empty("deviceId", &self.device_id)?;
        require_non_negative("capacity", self.capacity)?;
        require_non_negative("occupancy", self.occupancy)?;
        require_within_capacity(self.occupancy, self.capacity)
    }
}

/// Partial update. `None` covers both an absent key and an explicit `null`;
/// neither touches the stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateClassroomRequest {
    #[serde(rename = "deviceId", default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub capacity: Option<i64>,
    #[serde(default)]
    pub occupancy: Option<i64>,
}

impl UpdateClassroomRequest {
    /// Checks that hold without looking at the stored record.
    pub fn validate(&self) -> Result<(), AppError> {
        if let Some(device_id) = &self.device_id {
            require_non_empty("deviceId", device_id)?;
        }
        if let Some(capacity) = self.capacity {
            require_non_negative("capacity", capacity)?;
        }
        if let Some(occupancy) = self.occupancy {
            require_non_negative("occupancy", occupancy)?;
        }
        if let (Some(capacity), Some(occupancy)) = (self.capacity, self.occupancy) {
            require_within_capacity(occupancy, capacity)?;
        }
        Ok(())
    }

    pub fn touches_limits(&self) -> bool {
        self.capacity.is_some() || self.occupancy.is_some()
    }

    /// Rejects the update when the record it would produce has
    /// `occupancy > capacity`.
    pub fn check_against(&self, current: &Classroom) -> Result<(), AppError> {
        let capacity = self.capacity.unwrap_or(current.capacity);
        let occupancy = self.occupancy.unwrap_or(current.occupancy);
        require_within_capacity(occupancy, capacity)
    }
}

/// Fields written by the store's partial update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassroomPatch {
    pub device_id: Option<String>,
    pub capacity: Option<i64>,
    pub occupancy: Option<i64>,
}

impl ClassroomPatch {
    pub fn occupancy(occupancy: i64) -> Self {
        Self {
            occupancy: Some(occupancy),
            ..Self::default()
        }
    }
}

impl From<UpdateClassroomRequest> for ClassroomPatch {
    fn from(req: UpdateClassroomRequest) -> Self {
        Self {
            device_id: req.device_id,
            capacity: req.capacity,
            occupancy: req.occupancy,
        }
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn require_non_negative(field: &str, value: i64) -> Result<(), AppError> {
    if value < 0 {
        return Err(AppError::BadRequest(format!("{} must be >= 0", field)));
    }
    Ok(())
}

fn require_within_capacity(occupancy: i64, capacity: i64) -> Result<(), AppError> {
    if occupancy > capacity {
        return Err(AppError::BadRequest(
            "occupancy cannot exceed capacity".to_string(),
        ));
    }
    Ok(())
}
