// src/services/store.rs
//! Persistence collaborator for before/after pairs, backed by Redis.
//!
//! Records are JSON values keyed by id; a per-user sorted set indexed by
//! creation time drives newest-first, cursor-based listing.

use chrono::Utc;
use redis::{AsyncCommands, Client};
use uuid::Uuid;

use crate::errors::RestyleError;
use crate::models::{Transformation, TransformationPage};

pub struct TransformationStore {
    client: Client,
}

/// Fields of a record the caller supplies; ids and timestamps are assigned
/// here.
#[derive(Debug, Clone)]
pub struct NewTransformation {
    pub user_id: String,
    pub original_image_url: String,
    pub transformed_image_url: String,
    pub hair_color: Option<String>,
    pub hair_style: Option<String>,
    pub prompt: Option<String>,
}

fn record_key(id: &str) -> String {
    format!("transformation:{id}")
}

fn index_key(user_id: &str) -> String {
    format!("user:{user_id}:transformations")
}

impl TransformationStore {
    pub async fn new(redis_url: &str) -> Result<Self, RestyleError> {
        let client = Client::open(redis_url).map_err(|e| RestyleError::Storage(e.to_string()))?;

        // Test connection
        let mut conn = client
            .get_async_connection()
            .await
            .map_err(|e| RestyleError::Storage(e.to_string()))?;

        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| RestyleError::Storage(e.to_string()))?;

        Ok(Self { client })
    }

    pub async fn save(&self, new: NewTransformation) -> Result<Transformation, RestyleError> {
        let now = Utc::now();
        let record = Transformation {
            id: Uuid::new_v4().to_string(),
            user_id: new.user_id,
            original_image_url: new.original_image_url,
            transformed_image_url: new.transformed_image_url,
            hair_color: new.hair_color,
            hair_style: new.hair_style,
            prompt: new.prompt,
            created_at: now,
            updated_at: now,
        };

        let mut conn = self.client.get_async_connection().await?;
        let value = serde_json::to_string(&record)?;
        conn.set::<_, _, ()>(record_key(&record.id), value).await?;
        conn.zadd::<_, _, _, ()>(
            index_key(&record.user_id),
            record.id.clone(),
            record.created_at.timestamp_millis(),
        )
        .await?;

        log::info!(
            "Transformation saved: {} for user {}",
            record.id,
            record.user_id
        );
        Ok(record)
    }

    /// Page through a user's records, newest first. The cursor is the id of
    /// the last record of the previous page.
    pub async fn list(
        &self,
        user_id: &str,
        limit: usize,
        last_doc_id: Option<&str>,
    ) -> Result<TransformationPage, RestyleError> {
        let mut conn = self.client.get_async_connection().await?;

        let max_score = match last_doc_id {
            Some(id) => match self.load(&mut conn, id).await? {
                Some(record) => format!("({}", record.created_at.timestamp_millis()),
                None => "+inf".to_string(),
            },
            None => "+inf".to_string(),
        };

        let ids: Vec<String> = redis::cmd("ZREVRANGEBYSCORE")
            .arg(index_key(user_id))
            .arg(&max_score)
            .arg("-inf")
            .arg("LIMIT")
            .arg(0)
            .arg(limit)
            .query_async(&mut conn)
            .await?;

        let mut transformations = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(record) = self.load(&mut conn, id).await? {
                transformations.push(record);
            }
        }

        let has_more = ids.len() == limit;
        let last_doc_id = if has_more {
            ids.last().cloned()
        } else {
            None
        };

        Ok(TransformationPage {
            count: transformations.len(),
            transformations,
            limit,
            has_more,
            last_doc_id,
        })
    }

    pub async fn get(&self, user_id: &str, id: &str) -> Result<Transformation, RestyleError> {
        let mut conn = self.client.get_async_connection().await?;
        let record = self
            .load(&mut conn, id)
            .await?
            .ok_or_else(|| RestyleError::NotFound("Transformation".to_string()))?;

        if record.user_id != user_id {
            return Err(RestyleError::Forbidden);
        }
        Ok(record)
    }

    pub async fn delete(&self, user_id: &str, id: &str) -> Result<(), RestyleError> {
        // Ownership check before any mutation.
        let record = self.get(user_id, id).await?;

        let mut conn = self.client.get_async_connection().await?;
        conn.del::<_, ()>(record_key(id)).await?;
        conn.zrem::<_, _, ()>(index_key(&record.user_id), id).await?;

        log::info!("Transformation deleted: {} by user {}", id, user_id);
        Ok(())
    }

    async fn load(
        &self,
        conn: &mut redis::aio::Connection,
        id: &str,
    ) -> Result<Option<Transformation>, RestyleError> {
        let value: Option<String> = conn.get(record_key(id)).await?;
        match value {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}
