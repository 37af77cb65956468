pub mod repository;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::error;

use crate::error::AppError;
use crate::models::{Classroom, ClassroomPatch, CreateClassroomRequest};

/// CRUD over classrooms keyed by `classId`.
///
/// Absence is reported as `None`/`false`, never as an error. Any driver or
/// connectivity fault surfaces as [`AppError::StoreUnavailable`].
#[async_trait]
pub trait ClassroomStore: Send + Sync {
    /// Inserts a classroom and returns its generated identifier.
    async fn create(&self, req: &CreateClassroomRequest) -> Result<String, AppError>;
    async fn get_by_class_id(&self, class_id: &str) -> Result<Option<Classroom>, AppError>;
    async fn list(&self) -> Result<Vec<Classroom>, AppError>;
    async fn update_partial(
        &self,
        class_id: &str,
        patch: &ClassroomPatch,
    ) -> Result<Option<Classroom>, AppError>;
    async fn delete(&self, class_id: &str) -> Result<bool, AppError>;
    async fn ping(&self) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct SqliteClassroomStore {
    db: SqlitePool,
    list_limit: i64,
}

impl SqliteClassroomStore {
    pub fn new(db: SqlitePool, list_limit: i64) -> Self {
        Self { db, list_limit }
    }
}

fn unavailable(op: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| {
        error!("record store error during {}: {}", op, e);
        AppError::StoreUnavailable
    }
}

#[async_trait]
impl ClassroomStore for SqliteClassroomStore {
    async fn create(&self, req: &CreateClassroomRequest) -> Result<String, AppError> {
        match repository::insert_classroom(&self.db, req).await {
            Ok(classroom) => Ok(classroom.id),
            Err(e)
                if e.as_database_error()
                    .map(|db_err| db_err.is_unique_violation())
                    .unwrap_or(false) =>
            {
                Err(AppError::Conflict("classId already exists".to_string()))
            }
            Err(e) => Err(unavailable("create")(e)),
        }
    }

    async fn get_by_class_id(&self, class_id: &str) -> Result<Option<Classroom>, AppError> {
        repository::find_classroom(&self.db, class_id)
            .await
            .map_err(unavailable("get"))
    }

    async fn list(&self) -> Result<Vec<Classroom>, AppError> {
        repository::fetch_classrooms(&self.db, self.list_limit)
            .await
            .map_err(unavailable("list"))
    }

    async fn update_partial(
        &self,
        class_id: &str,
        patch: &ClassroomPatch,
    ) -> Result<Option<Classroom>, AppError> {
        repository::update_classroom(&self.db, class_id, patch)
            .await
            .map_err(unavailable("update"))
    }

    async fn delete(&self, class_id: &str) -> Result<bool, AppError> {
        repository::delete_classroom(&self.db, class_id)
            .await
            .map_err(unavailable("delete"))
    }

    async fn ping(&self) -> Result<(), AppError> {
        repository::ping(&self.db).await.map_err(unavailable("ping"))
    }
}
