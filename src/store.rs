use crate::types::{NewsletterError, NewsletterRecord, Result, Topic, UserProfile};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

/// Persistent storage for users, topics, subscriptions and the newsletter
/// audit log.
pub struct Store {
    db: PgPool,
}

impl Store {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let db = PgPool::connect(database_url).await?;
        Ok(Self { db })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!().run(&self.db).await?;
        info!("database migrations applied");
        Ok(())
    }

    /// Look up a user by id. A malformed id is treated the same as an
    /// unknown one.
    pub async fn get_user(&self, user_id: &str) -> Result<UserProfile> {
        let id = parse_user_id(user_id)?;

        let row = sqlx::query(
            "SELECT id, name, email, phone, telegram_id, preferences, created_at, updated_at \
             FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some(row) => {
                let preferences: serde_json::Value = row.try_get("preferences")?;
                Ok(UserProfile {
                    id: row.try_get::<Uuid, _>("id")?.to_string(),
                    name: row.try_get("name")?,
                    email: row.try_get("email")?,
                    phone: row.try_get("phone")?,
                    telegram_id: row.try_get("telegram_id")?,
                    preferences: serde_json::from_value(preferences).unwrap_or_default(),
                    created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
                    updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
                })
            }
            None => Err(NewsletterError::UserNotFound {
                id: user_id.to_string(),
            }),
        }
    }

    /// The user's subscribed topics, ordered by subscription time.
    pub async fn get_user_topics(&self, user_id: &str) -> Result<Vec<Topic>> {
        let id = parse_user_id(user_id)?;

        let rows = sqlx::query(
            "SELECT t.id, t.name, t.description \
             FROM user_topics ut \
             JOIN topics t ON t.id = ut.topic_id \
             WHERE ut.user_id = $1 \
             ORDER BY ut.created_at",
        )
        .bind(id)
        .fetch_all(&self.db)
        .await?;

        let mut topics = Vec::with_capacity(rows.len());
        for row in rows {
            topics.push(Topic {
                id: row.try_get::<Uuid, _>("id")?.to_string(),
                name: row.try_get("name")?,
                description: row.try_get("description")?,
            });
        }

        debug!("user {} has {} subscribed topics", user_id, topics.len());
        Ok(topics)
    }

    /// Insert the audit row for a delivered newsletter. Rows are written
    /// once and never updated.
    pub async fn save_newsletter(&self, record: &NewsletterRecord) -> Result<Uuid> {
        let user_id = parse_user_id(&record.user_id)?;

        sqlx::query(
            "INSERT INTO newsletters (id, user_id, content, topics, channel, sent_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(record.id)
        .bind(user_id)
        .bind(&record.content)
        .bind(&record.topics)
        .bind(record.channel.as_str())
        .bind(record.sent_at)
        .bind(record.created_at)
        .execute(&self.db)
        .await?;

        info!(
            "saved newsletter record {} for user {}",
            record.id, record.user_id
        );
        Ok(record.id)
    }

    pub async fn create_user(
        &self,
        name: &str,
        email: &str,
        phone: Option<&str>,
    ) -> Result<Uuid> {
        let row = sqlx::query(
            "INSERT INTO users (name, email, phone, preferences) \
             VALUES ($1, $2, $3, '{}') \
             ON CONFLICT (email) DO UPDATE SET name = EXCLUDED.name \
             RETURNING id",
        )
        .bind(name)
        .bind(email)
        .bind(phone)
        .fetch_one(&self.db)
        .await?;

        Ok(row.try_get("id")?)
    }

    pub async fn create_topic(&self, name: &str, description: Option<&str>) -> Result<Uuid> {
        let row = sqlx::query(
            "INSERT INTO topics (name, description) \
             VALUES ($1, $2) \
             ON CONFLICT (name) DO UPDATE SET description = EXCLUDED.description \
             RETURNING id",
        )
        .bind(name)
        .bind(description)
        .fetch_one(&self.db)
        .await?;

        Ok(row.try_get("id")?)
    }

    pub async fn subscribe(&self, user_id: Uuid, topic_id: Uuid) -> Result<()> {
        sqlx::query(
            "INSERT INTO user_topics (user_id, topic_id) \
             VALUES ($1, $2) \
             ON CONFLICT (user_id, topic_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(topic_id)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Create the demo topics and user shipped with the project, wiring the
    /// user to the first two topics. Safe to run repeatedly.
    pub async fn seed_demo_data(&self) -> Result<UserProfile> {
        let demo_topics: [(&str, &str); 5] = [
            (
                "Artificial Intelligence",
                "News about AI, machine learning and related technologies",
            ),
            (
                "Climate Change",
                "News about the environment and climate change",
            ),
            ("Technology", "General news about technology and gadgets"),
            ("Science", "Scientific discoveries and research advances"),
            ("Business", "News about companies, startups and the economy"),
        ];

        let mut topic_ids = Vec::with_capacity(demo_topics.len());
        for (name, description) in demo_topics {
            topic_ids.push(self.create_topic(name, Some(description)).await?);
        }

        let user_id = self
            .create_user("Test User", "test@example.com", Some("+1234567890"))
            .await?;

        for topic_id in topic_ids.iter().take(2) {
            self.subscribe(user_id, *topic_id).await?;
        }

        info!("seeded demo user {} with 2 subscriptions", user_id);
        self.get_user(&user_id.to_string()).await
    }
}

fn parse_user_id(user_id: &str) -> Result<Uuid> {
    Uuid::parse_str(user_id).map_err(|_| NewsletterError::UserNotFound {
        id: user_id.to_string(),
    })
}
