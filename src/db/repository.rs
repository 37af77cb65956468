use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{Classroom, ClassroomPatch, CreateClassroomRequest};

const CLASSROOM_COLUMNS: &str =
    "id, class_id, device_id, capacity, occupancy, created_at, updated_at";

pub async fn insert_classroom(
    db: &SqlitePool,
    req: &CreateClassroomRequest,
) -> Result<Classroom, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO classrooms
            (id, class_id, device_id, capacity, occupancy, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
        "#,
    )
    .bind(&id)
    .bind(&req.class_id)
    .bind(&req.device_id)
    .bind(req.capacity)
    .bind(req.occupancy)
    .bind(now)
    .execute(db)
    .await?;

    Ok(Classroom {
        id,
        class_id: req.class_id.clone(),
        device_id: req.device_id.clone(),
        capacity: req.capacity,
        occupancy: req.occupancy,
        created_at: now,
        updated_at: now,
    })
}

pub async fn find_classroom(
    db: &SqlitePool,
    class_id: &str,
) -> Result<Option<Classroom>, sqlx::Error> {
    sqlx::query_as::<_, Classroom>(&format!(
        "SELECT {} FROM classrooms WHERE class_id = ?1",
        CLASSROOM_COLUMNS
    ))
    .bind(class_id)
    .fetch_optional(db)
    .await
}

/// Returns at most `limit` classrooms in insertion order. There is no cursor.
pub async fn fetch_classrooms(db: &SqlitePool, limit: i64) -> Result<Vec<Classroom>, sqlx::Error> {
    sqlx::query_as::<_, Classroom>(&format!(
        "SELECT {} FROM classrooms ORDER BY rowid LIMIT ?1",
        CLASSROOM_COLUMNS
    ))
    .bind(limit)
    .fetch_all(db)
    .await
}

/// Applies the provided fields and refreshes `updated_at` in one statement.
/// The written occupancy is capped at the resulting capacity.
pub async fn update_classroom(
    db: &SqlitePool,
    class_id: &str,
    patch: &ClassroomPatch,
) -> Result<Option<Classroom>, sqlx::Error> {
    sqlx::query_as::<_, Classroom>(&format!(
        r#"
        UPDATE classrooms
        SET device_id = COALESCE(?1, device_id),
            capacity = COALESCE(?2, capacity),
            occupancy = MIN(COALESCE(?3, occupancy), COALESCE(?2, capacity)),
            updated_at = ?4
        WHERE class_id = ?5
        RETURNING {}
        "#,
        CLASSROOM_COLUMNS
    ))
    .bind(&patch.device_id)
    .bind(patch.capacity)
    .bind(patch.occupancy)
    .bind(Utc::now())
    .bind(class_id)
    .fetch_optional(db)
    .await
}

pub async fn delete_classroom(db: &SqlitePool, class_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM classrooms WHERE class_id = ?1")
        .bind(class_id)
        .execute(db)
        .await?
        .rows_affected();

    Ok(result == 1)
}

pub async fn ping(db: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query("select 1").execute(db).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test db");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");

        pool
    }

    fn new_classroom(class_id: &str, capacity: i64) -> CreateClassroomRequest {
        CreateClassroomRequest {
            class_id: class_id.to_string(),
            device_id: "dev-1".to_string(),
            capacity,
            occupancy: 0,
        }
    }

    #[tokio::test]
    async fn test_insert_and_find_classroom() {
        let pool = setup_test_db().await;

        let created = insert_classroom(&pool, &new_classroom("EEE101", 10))
            .await
            .expect("Failed to insert classroom");
        assert_eq!(created.created_at, created.updated_at);

        let found = find_classroom(&pool, "EEE101")
            .await
            .expect("Failed to find classroom")
            .expect("Classroom not found");
        assert_eq!(found.id, created.id);
        assert_eq!(found.device_id, "dev-1");
        assert_eq!(found.capacity, 10);
        assert_eq!(found.occupancy, 0);

        let missing = find_classroom(&pool, "NOPE").await.expect("Query failed");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_class_id_is_unique_violation() {
        let pool = setup_test_db().await;

        insert_classroom(&pool, &new_classroom("EEE101", 10))
            .await
            .expect("Failed to insert classroom");
        let err = insert_classroom(&pool, &new_classroom("EEE101", 20))
            .await
            .expect_err("Duplicate insert should fail");

        let is_unique = err
            .as_database_error()
            .map(|e| e.is_unique_violation())
            .unwrap_or(false);
        assert!(is_unique);
    }

    #[tokio::test]
    async fn test_fetch_classrooms_respects_limit() {
        let pool = setup_test_db().await;

        for id in ["A1", "A2", "A3"] {
            insert_classroom(&pool, &new_classroom(id, 5))
                .await
                .expect("Failed to insert classroom");
        }

        let all = fetch_classrooms(&pool, 1000).await.expect("Failed to fetch");
        assert_eq!(
            all.iter().map(|c| c.class_id.as_str()).collect::<Vec<_>>(),
            vec!["A1", "A2", "A3"]
        );

        let limited = fetch_classrooms(&pool, 2).await.expect("Failed to fetch");
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn test_update_classroom_only_touches_given_fields() {
        let pool = setup_test_db().await;

        let created = insert_classroom(&pool, &new_classroom("EEE101", 10))
            .await
            .expect("Failed to insert classroom");

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let updated = update_classroom(&pool, "EEE101", &ClassroomPatch::occupancy(5))
            .await
            .expect("Failed to update")
            .expect("Classroom not found");

        assert_eq!(updated.occupancy, 5);
        assert_eq!(updated.capacity, 10);
        assert_eq!(updated.device_id, "dev-1");
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at > created.updated_at);

        let stored = find_classroom(&pool, "EEE101")
            .await
            .expect("Query failed")
            .expect("Classroom not found");
        assert_eq!(stored.updated_at, updated.updated_at);

        let patch = ClassroomPatch {
            device_id: Some("dev-2".to_string()),
            ..Default::default()
        };
        let updated = update_classroom(&pool, "EEE101", &patch)
            .await
            .expect("Failed to update")
            .expect("Classroom not found");
        assert_eq!(updated.device_id, "dev-2");
        assert_eq!(updated.occupancy, 5);
    }

    #[tokio::test]
    async fn test_update_caps_occupancy_at_capacity() {
        let pool = setup_test_db().await;

        insert_classroom(&pool, &new_classroom("EEE101", 10))
            .await
            .expect("Failed to insert classroom");

        let updated = update_classroom(&pool, "EEE101", &ClassroomPatch::occupancy(12))
            .await
            .expect("Failed to update")
            .expect("Classroom not found");
        assert_eq!(updated.occupancy, 10);

        let patch = ClassroomPatch {
            capacity: Some(3),
            ..Default::default()
        };
        let updated = update_classroom(&pool, "EEE101", &patch)
            .await
            .expect("Failed to update")
            .expect("Classroom not found");
        assert_eq!(updated.capacity, 3);
        assert_eq!(updated.occupancy, 3);
    }

    #[tokio::test]
    async fn test_insert_above_capacity_violates_check() {
        let pool = setup_test_db().await;

        let req = CreateClassroomRequest {
            occupancy: 11,
            ..new_classroom("EEE101", 10)
        };
        assert!(insert_classroom(&pool, &req).await.is_err());
    }

    #[tokio::test]
    async fn test_update_unknown_classroom_returns_none() {
        let pool = setup_test_db().await;

        let result = update_classroom(&pool, "NOPE", &ClassroomPatch::occupancy(1))
            .await
            .expect("Failed to update");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_delete_classroom() {
        let pool = setup_test_db().await;

        insert_classroom(&pool, &new_classroom("EEE101", 10))
            .await
            .expect("Failed to insert classroom");

        assert!(delete_classroom(&pool, "EEE101").await.expect("Delete failed"));
        assert!(!delete_classroom(&pool, "EEE101").await.expect("Delete failed"));
        assert!(find_classroom(&pool, "EEE101").await.expect("Query failed").is_none());
    }
}
