//! Document database operations

use uuid::Uuid;

use super::AppState;
use crate::auth::ADMIN_ROLE;
use crate::document::models::Document;

const DOCUMENT_COLUMNS: &str = "id, user_id, document_type, title, form_data, status, attachments, is_deleted, created_at, updated_at";

impl AppState {
    /// Live documents owned by `user_id`, most recently edited first.
    pub async fn get_documents_for_user(&self, user_id: &Uuid) -> Result<Vec<Document>, sqlx::Error> {
        sqlx::query_as::<_, Document>(&format!(
            "SELECT {} FROM documents WHERE user_id = $1 AND is_deleted = FALSE ORDER BY updated_at DESC",
            DOCUMENT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Every document of `user_id`, soft-deleted ones included.
    pub async fn get_all_documents_for_user(&self, user_id: &Uuid) -> Result<Vec<Document>, sqlx::Error> {
        sqlx::query_as::<_, Document>(&format!(
            "SELECT {} FROM documents WHERE user_id = $1 ORDER BY created_at DESC",
            DOCUMENT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    /// A live document by id, served from cache when possible.
    pub async fn get_document(&self, id: &Uuid) -> Result<Option<Document>, sqlx::Error> {
        if let Some(document) = self.document_cache.get(id).await {
            log::debug!("Document cache hit for {}", id);
            return Ok(Some(document));
        }

        let document = sqlx::query_as::<_, Document>(&format!(
            "SELECT {} FROM documents WHERE id = $1 AND is_deleted = FALSE",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(document) = &document {
            self.document_cache.insert(*id, document.clone()).await;
        }
        Ok(document)
    }

    /// A live document `user_id` may read: their own, or any for admins.
    pub async fn get_visible_document(
        &self,
        id: &Uuid,
        user_id: &Uuid,
    ) -> Result<Option<Document>, sqlx::Error> {
        let Some(document) = self.get_document(id).await? else {
            return Ok(None);
        };
        if document.user_id == *user_id || self.is_admin(user_id).await? {
            Ok(Some(document))
        } else {
            Ok(None)
        }
    }

    pub async fn insert_document(&self, document: &Document) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, user_id, document_type, title, form_data, status, attachments, is_deleted, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(document.id)
        .bind(document.user_id)
        .bind(document.document_type)
        .bind(&document.title)
        .bind(&document.form_data)
        .bind(document.status)
        .bind(&document.attachments)
        .bind(document.is_deleted)
        .bind(document.created_at)
        .bind(document.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn update_document(&self, document: &Document) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE documents
             SET title = $2, form_data = $3, status = $4, attachments = $5, updated_at = $6
             WHERE id = $1 AND is_deleted = FALSE
            "#,
        )
        .bind(document.id)
        .bind(&document.title)
        .bind(&document.form_data)
        .bind(document.status)
        .bind(&document.attachments)
        .bind(document.updated_at)
        .execute(&self.pool)
        .await?;

        self.document_cache.invalidate(&document.id).await;
        Ok(())
    }

    /// Hide a document from its owner. Returns false if nothing matched.
    pub async fn soft_delete_document(&self, id: &Uuid, user_id: &Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE documents SET is_deleted = TRUE, updated_at = NOW() WHERE id = $1 AND user_id = $2 AND is_deleted = FALSE",
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        self.document_cache.invalidate(id).await;
        Ok(result.rows_affected() > 0)
    }

    /// Remove a document row for good and return it.
    pub async fn hard_delete_document(&self, id: &Uuid) -> Result<Option<Document>, sqlx::Error> {
        let deleted = sqlx::query_as::<_, Document>(&format!(
            "DELETE FROM documents WHERE id = $1 RETURNING {}",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        self.document_cache.invalidate(id).await;
        Ok(deleted)
    }

    /// Remove every document of `user_id` and return the deleted rows.
    pub async fn hard_delete_documents_for_user(&self, user_id: &Uuid) -> Result<Vec<Document>, sqlx::Error> {
        let deleted = sqlx::query_as::<_, Document>(&format!(
            "DELETE FROM documents WHERE user_id = $1 RETURNING {}",
            DOCUMENT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        for document in &deleted {
            self.document_cache.invalidate(&document.id).await;
        }
        Ok(deleted)
    }

    pub async fn is_admin(&self, user_id: &Uuid) -> Result<bool, sqlx::Error> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM user_roles WHERE user_id = $1 AND role = $2)",
        )
        .bind(user_id)
        .bind(ADMIN_ROLE)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_columns_match_model_fields() {
        let columns: Vec<&str> = DOCUMENT_COLUMNS.split(", ").collect();
        assert_eq!(columns.len(), 10);
        assert!(columns.contains(&"attachments"));
        assert!(columns.contains(&"is_deleted"));
    }
}
