use super::{validate_for_write, MessageQuery, MessageRepository, Provisioned, SchemaAdmin};
use crate::error::{StoreError, StoreResult};
use crate::models::{ContentType, Message};
use crate::schema::{
    message_indexes, DocumentValidator, FieldKind, FieldSpec, IndexSpec, Namespace, PlannedBranch,
    QueryPlan,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use db_pool::acquire_with_metrics;
use serde_json::Value;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Table holding index options PostgreSQL cannot store itself (expiry windows)
const INDEX_REGISTRY: &str = "_message_store_indexes";

/// Label for pool acquisition metrics
const POOL_METRICS_LABEL: &str = "message-store";

const COLUMNS: &str = r#"id, sender_id, recipient_id, group_id, content, content_type, "timestamp",
    read_by, delivered_to, reply_to_id, attachments, is_edited, edit_timestamp"#;

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: String,
    sender_id: String,
    recipient_id: Option<String>,
    group_id: Option<String>,
    content: String,
    content_type: String,
    timestamp: DateTime<Utc>,
    read_by: Vec<String>,
    delivered_to: Vec<String>,
    reply_to_id: Option<String>,
    attachments: Vec<String>,
    is_edited: bool,
    edit_timestamp: Option<DateTime<Utc>>,
}

impl TryFrom<MessageRow> for Message {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let content_type: ContentType = row
            .content_type
            .parse()
            .map_err(|e| StoreError::Malformed(format!("message {}: {e}", row.id)))?;

        Ok(Message {
            id: row.id,
            sender_id: row.sender_id,
            recipient_id: row.recipient_id,
            group_id: row.group_id,
            content: row.content,
            content_type,
            timestamp: row.timestamp,
            read_by: row.read_by,
            delivered_to: row.delivered_to,
            reply_to_id: row.reply_to_id,
            attachments: row.attachments,
            is_edited: row.is_edited,
            edit_timestamp: row.edit_timestamp,
        })
    }
}

fn quote(ident: &str) -> String {
    format!("\"{ident}\"")
}

fn column_type(field: &FieldSpec) -> &'static str {
    match field.kind {
        FieldKind::String => "TEXT",
        FieldKind::Date => "TIMESTAMPTZ",
        FieldKind::Bool => "BOOLEAN",
        FieldKind::StringArray => "TEXT[]",
    }
}

/// `data_type` as reported by `information_schema.columns`
fn information_schema_type(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::String => "text",
        FieldKind::Date => "timestamp with time zone",
        FieldKind::Bool => "boolean",
        FieldKind::StringArray => "ARRAY",
    }
}

/// Booleans and arrays are NOT NULL with a default even when optional
fn column_not_null(field: &FieldSpec) -> bool {
    field.name == "id"
        || field.required
        || matches!(field.kind, FieldKind::Bool | FieldKind::StringArray)
}

fn column_definition(field: &FieldSpec) -> String {
    let mut def = format!("{} {}", quote(field.name), column_type(field));

    if field.name == "id" {
        def.push_str(" PRIMARY KEY");
    } else if column_not_null(field) {
        def.push_str(" NOT NULL");
        if !field.required {
            match field.kind {
                FieldKind::Bool => def.push_str(" DEFAULT FALSE"),
                FieldKind::StringArray => def.push_str(" DEFAULT '{}'"),
                _ => {}
            }
        }
    }

    if let Some(allowed) = field.allowed {
        let values = allowed
            .iter()
            .map(|v| format!("'{v}'"))
            .collect::<Vec<_>>()
            .join(", ");
        def.push_str(&format!(" CHECK ({} IN ({values}))", quote(field.name)));
    }

    def
}

/// Named table constraints tying fields together, as (name, expression)
fn table_checks(collection: &str, validator: &DocumentValidator) -> Vec<(String, &'static str)> {
    let mut checks = Vec::new();
    if validator.field("recipient_id").is_some() && validator.field("group_id").is_some() {
        checks.push((
            format!("{collection}_single_target"),
            "num_nonnulls(recipient_id, group_id) = 1",
        ));
    }
    if validator.field("edit_timestamp").is_some() && validator.field("is_edited").is_some() {
        checks.push((
            format!("{collection}_edit_flag"),
            "edit_timestamp IS NULL OR is_edited",
        ));
    }
    checks
}

/// CHECK constraints the table should carry that `existing` (name, definition) lacks
fn missing_checks(
    collection: &str,
    validator: &DocumentValidator,
    existing: &[(String, String)],
) -> Vec<String> {
    let mut missing = Vec::new();

    for field in validator.fields() {
        let Some(allowed) = field.allowed else {
            continue;
        };
        let enforced = existing.iter().any(|(_, def)| {
            def.contains(field.name) && allowed.iter().all(|v| def.contains(&format!("'{v}'")))
        });
        if !enforced {
            missing.push(format!("{} values check", field.name));
        }
    }

    for (name, _) in table_checks(collection, validator) {
        if !existing.iter().any(|(existing_name, _)| *existing_name == name) {
            missing.push(name);
        }
    }
    missing
}

fn registry_table(namespace: &Namespace) -> String {
    format!("{}.{}", quote(namespace.database()), quote(INDEX_REGISTRY))
}

fn collection_ddl(namespace: &Namespace, validator: &DocumentValidator) -> Vec<String> {
    let collection = namespace.collection();
    let mut columns: Vec<String> = validator.fields().iter().map(column_definition).collect();
    columns.extend(
        table_checks(collection, validator)
            .into_iter()
            .map(|(name, expr)| format!("CONSTRAINT {} CHECK ({expr})", quote(&name))),
    );

    vec![
        format!("CREATE SCHEMA IF NOT EXISTS {}", quote(namespace.database())),
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            namespace.qualified(),
            columns.join(",\n    ")
        ),
        registry_ddl(namespace),
    ]
}

fn registry_ddl(namespace: &Namespace) -> String {
    format!(
        r#"CREATE TABLE IF NOT EXISTS {} (
    collection TEXT NOT NULL,
    name TEXT NOT NULL,
    key_pattern TEXT NOT NULL,
    expire_after_seconds BIGINT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (collection, key_pattern)
)"#,
        registry_table(namespace)
    )
}

fn index_ddl(namespace: &Namespace, index: &IndexSpec) -> String {
    let keys = index
        .keys
        .iter()
        .map(|k| format!("{} {}", quote(&k.field), k.direction.as_sql()))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} ({keys})",
        quote(&index.name(namespace.collection())),
        namespace.qualified()
    )
}

/// Every statement provisioning runs, in order; used by `--dry-run`
pub fn ddl_statements(namespace: &Namespace, ttl: Duration) -> Vec<String> {
    let mut statements = collection_ddl(namespace, &DocumentValidator::message());
    statements.extend(
        message_indexes(ttl)
            .iter()
            .map(|index| index_ddl(namespace, index)),
    );
    statements
}

fn map_write_error(err: sqlx::Error, id: &str) -> StoreError {
    if let Some(db_err) = err.as_database_error() {
        match db_err.code().as_deref() {
            // unique_violation
            Some("23505") => return StoreError::DuplicateId(id.to_string()),
            // check_violation, not_null_violation
            Some("23514") | Some("23502") => {
                return StoreError::Rejected(db_err.message().to_string())
            }
            _ => {}
        }
    }
    StoreError::Database(err)
}

/// Predicate and its positional arguments for a filter
fn filter_sql(query: &MessageQuery) -> (&'static str, Vec<&str>) {
    use super::MessageFilter::*;
    match &query.filter {
        Sender(user) => ("sender_id = $1", vec![user.as_str()]),
        Recipient(user) => ("recipient_id = $1", vec![user.as_str()]),
        Group(group) => ("group_id = $1", vec![group.as_str()]),
        Conversation { a, b } => (
            "((sender_id = $1 AND recipient_id = $2) OR (sender_id = $2 AND recipient_id = $1))",
            vec![a.as_str(), b.as_str()],
        ),
        Participant(user) => ("(sender_id = $1 OR recipient_id = $1)", vec![user.as_str()]),
    }
}

fn collect_plan(node: &Value, index_names: &mut Vec<String>, sorts: &mut bool) {
    if let Some(name) = node.get("Index Name").and_then(Value::as_str) {
        if !index_names.iter().any(|n| n == name) {
            index_names.push(name.to_string());
        }
    }
    if node.get("Node Type").and_then(Value::as_str) == Some("Sort") {
        *sorts = true;
    }
    if let Some(children) = node.get("Plans").and_then(Value::as_array) {
        for child in children {
            collect_plan(child, index_names, sorts);
        }
    }
}

/// PostgreSQL-backed message store
///
/// The namespace's database is a schema and its collection a table. Index
/// options PostgreSQL has no notion of (the TTL window) are kept in a
/// registry table next to the collection.
#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
    namespace: Namespace,
    validator: DocumentValidator,
}

impl PgMessageStore {
    pub fn new(pool: PgPool, namespace: Namespace) -> Self {
        Self {
            pool,
            namespace,
            validator: DocumentValidator::message(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn table(&self) -> String {
        self.namespace.qualified()
    }

    async fn collection_exists(&self) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT to_regclass($1::text) IS NOT NULL")
            .bind(self.table())
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    /// Existing table must carry every field with the expected type, nullability
    /// and default, plus the CHECK constraints provisioning would declare
    async fn check_compatible(&self, validator: &DocumentValidator) -> StoreResult<()> {
        let incompatible = |reason: String| StoreError::IncompatibleCollection {
            namespace: self.namespace.to_string(),
            reason,
        };

        let columns: Vec<(String, String, String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT column_name::text, data_type::text, is_nullable::text, column_default::text
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            "#,
        )
        .bind(self.namespace.database())
        .bind(self.namespace.collection())
        .fetch_all(&self.pool)
        .await?;

        for field in validator.fields() {
            let Some((_, data_type, is_nullable, default)) =
                columns.iter().find(|(name, ..)| name == field.name)
            else {
                return Err(incompatible(format!("column {} is missing", field.name)));
            };

            let expected = information_schema_type(field.kind);
            if data_type != expected {
                return Err(incompatible(format!(
                    "column {} is {data_type}, expected {expected}",
                    field.name
                )));
            }
            if column_not_null(field) && is_nullable == "YES" {
                return Err(incompatible(format!("column {} accepts NULL", field.name)));
            }
            if column_not_null(field) && !field.required && default.is_none() {
                return Err(incompatible(format!("column {} has no default", field.name)));
            }
        }

        let constraints: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT conname::text, pg_get_constraintdef(oid)
            FROM pg_constraint
            WHERE conrelid = to_regclass($1::text) AND contype = 'c'
            "#,
        )
        .bind(self.table())
        .fetch_all(&self.pool)
        .await?;

        let missing = missing_checks(self.namespace.collection(), validator, &constraints);
        if !missing.is_empty() {
            return Err(incompatible(format!("missing constraints: {}", missing.join(", "))));
        }
        Ok(())
    }

    fn select_sql(&self, predicate: &str, arg_count: usize, prefix: &str) -> String {
        let before = arg_count + 1;
        format!(
            r#"{prefix}SELECT {COLUMNS} FROM {table}
            WHERE {predicate} AND (${before}::timestamptz IS NULL OR "timestamp" < ${before})
            ORDER BY "timestamp" DESC, id DESC
            LIMIT ${limit} OFFSET ${offset}"#,
            table = self.table(),
            limit = before + 1,
            offset = before + 2,
        )
    }

    async fn add_to_set(&self, column: &str, id: &str, user_id: &str) -> StoreResult<()> {
        let sql = format!(
            "UPDATE {table} SET {column} = CASE WHEN $2 = ANY({column}) THEN {column} \
             ELSE array_append({column}, $2) END WHERE id = $1",
            table = self.table(),
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SchemaAdmin for PgMessageStore {
    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    async fn create_collection(&self, validator: &DocumentValidator) -> StoreResult<Provisioned> {
        if self.collection_exists().await? {
            self.check_compatible(validator).await?;
            sqlx::query(&registry_ddl(&self.namespace))
                .execute(&self.pool)
                .await?;
            debug!(namespace = %self.namespace, "Collection already exists");
            return Ok(Provisioned::AlreadyExists);
        }

        let mut tx = self.pool.begin().await?;
        for statement in collection_ddl(&self.namespace, validator) {
            sqlx::query(&statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;

        info!(namespace = %self.namespace, "Collection created");
        Ok(Provisioned::Created)
    }

    async fn create_index(&self, index: &IndexSpec) -> StoreResult<Provisioned> {
        let name = index.name(self.namespace.collection());
        let pattern = index.key_pattern();
        let expire_after = index.expire_after.map(|d| d.as_secs() as i64);

        let registered: Option<(String, Option<i64>)> = sqlx::query_as(&format!(
            "SELECT name, expire_after_seconds FROM {} WHERE collection = $1 AND key_pattern = $2",
            registry_table(&self.namespace)
        ))
        .bind(self.namespace.collection())
        .bind(&pattern)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((existing_name, existing_expiry)) = registered {
            if existing_expiry != expire_after {
                return Err(StoreError::IndexConflict {
                    name: existing_name,
                    reason: format!(
                        "expire_after_seconds is {existing_expiry:?}, requested {expire_after:?}"
                    ),
                });
            }
            // recreate if the physical index was dropped behind our back
            sqlx::query(&index_ddl(&self.namespace, index))
                .execute(&self.pool)
                .await?;
            return Ok(Provisioned::AlreadyExists);
        }

        let physically_present: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM pg_indexes WHERE schemaname = $1 AND indexname = $2)",
        )
        .bind(self.namespace.database())
        .bind(&name)
        .fetch_one(&self.pool)
        .await?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(&index_ddl(&self.namespace, index))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "INSERT INTO {} (collection, name, key_pattern, expire_after_seconds) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (collection, key_pattern) DO NOTHING",
            registry_table(&self.namespace)
        ))
        .bind(self.namespace.collection())
        .bind(&name)
        .bind(&pattern)
        .bind(expire_after)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        if physically_present {
            warn!(index = %name, "Index existed without a registry entry; adopted it");
            return Ok(Provisioned::AlreadyExists);
        }
        Ok(Provisioned::Created)
    }

    async fn indexes(&self) -> StoreResult<Vec<IndexSpec>> {
        let rows: Vec<(String, Option<i64>)> = sqlx::query_as(&format!(
            "SELECT key_pattern, expire_after_seconds FROM {} \
             WHERE collection = $1 ORDER BY created_at, name",
            registry_table(&self.namespace)
        ))
        .bind(self.namespace.collection())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(pattern, expire_after)| {
                Ok(IndexSpec {
                    keys: IndexSpec::parse_key_pattern(&pattern)?,
                    expire_after: expire_after.map(|s| Duration::from_secs(s.max(0) as u64)),
                })
            })
            .collect()
    }
}

#[async_trait]
impl MessageRepository for PgMessageStore {
    async fn insert(&self, message: &Message) -> StoreResult<()> {
        validate_for_write(Some(&self.validator), message)?;

        let sql = format!(
            "INSERT INTO {} ({COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            self.table()
        );
        sqlx::query(&sql)
            .bind(&message.id)
            .bind(&message.sender_id)
            .bind(&message.recipient_id)
            .bind(&message.group_id)
            .bind(&message.content)
            .bind(message.content_type.as_str())
            .bind(message.timestamp)
            .bind(&message.read_by)
            .bind(&message.delivered_to)
            .bind(&message.reply_to_id)
            .bind(&message.attachments)
            .bind(message.is_edited)
            .bind(message.edit_timestamp)
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error(e, &message.id))?;

        debug!(message_id = %message.id, "Message inserted");
        Ok(())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Message>> {
        let sql = format!("SELECT {COLUMNS} FROM {} WHERE id = $1", self.table());
        let row: Option<MessageRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Message::try_from).transpose()
    }

    async fn find(&self, query: &MessageQuery) -> StoreResult<Vec<Message>> {
        let (predicate, binds) = filter_sql(query);
        let sql = self.select_sql(predicate, binds.len(), "");

        let mut select = sqlx::query_as::<_, MessageRow>(&sql);
        for value in binds {
            select = select.bind(value);
        }
        let rows = select
            .bind(query.before)
            .bind(query.page_size() as i64)
            .bind(query.offset as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Message::try_from).collect()
    }

    /// Branches reflect the index scans PostgreSQL chose, one per distinct index
    async fn explain(&self, query: &MessageQuery) -> StoreResult<QueryPlan> {
        let (predicate, binds) = filter_sql(query);
        let sql = self.select_sql(predicate, binds.len(), "EXPLAIN (FORMAT JSON) ");

        let mut explain = sqlx::query_scalar::<_, Value>(&sql);
        for value in binds {
            explain = explain.bind(value);
        }
        let plan = explain
            .bind(query.before)
            .bind(query.page_size() as i64)
            .bind(query.offset as i64)
            .fetch_one(&self.pool)
            .await?;

        let mut index_names = Vec::new();
        let mut sorts = false;
        if let Some(root) = plan.get(0).and_then(|p| p.get("Plan")) {
            collect_plan(root, &mut index_names, &mut sorts);
        }

        let branches = if index_names.is_empty() {
            vec![PlannedBranch {
                index: None,
                sort_covered: !sorts,
            }]
        } else {
            index_names
                .into_iter()
                .map(|name| PlannedBranch {
                    index: Some(name),
                    sort_covered: !sorts,
                })
                .collect()
        };
        Ok(QueryPlan { branches })
    }

    async fn mark_read(&self, id: &str, user_id: &str) -> StoreResult<()> {
        self.add_to_set("read_by", id, user_id).await
    }

    async fn mark_delivered(&self, id: &str, user_id: &str) -> StoreResult<()> {
        self.add_to_set("delivered_to", id, user_id).await
    }

    async fn replace(&self, message: &Message) -> StoreResult<()> {
        validate_for_write(Some(&self.validator), message)?;

        let sql = format!(
            r#"UPDATE {} SET
                sender_id = $2, recipient_id = $3, group_id = $4, content = $5,
                content_type = $6, "timestamp" = $7, read_by = $8, delivered_to = $9,
                reply_to_id = $10, attachments = $11, is_edited = $12, edit_timestamp = $13
            WHERE id = $1"#,
            self.table()
        );
        let result = sqlx::query(&sql)
            .bind(&message.id)
            .bind(&message.sender_id)
            .bind(&message.recipient_id)
            .bind(&message.group_id)
            .bind(&message.content)
            .bind(message.content_type.as_str())
            .bind(message.timestamp)
            .bind(&message.read_by)
            .bind(&message.delivered_to)
            .bind(&message.reply_to_id)
            .bind(&message.attachments)
            .bind(message.is_edited)
            .bind(message.edit_timestamp)
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error(e, &message.id))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(message.id.clone()));
        }
        Ok(())
    }

    async fn edit(
        &self,
        id: &str,
        editor_id: &str,
        content: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Message> {
        let sql = format!(
            r#"UPDATE {} SET
                content = $3, is_edited = TRUE, edit_timestamp = GREATEST($4, "timestamp")
            WHERE id = $1 AND sender_id = $2
            RETURNING {COLUMNS}"#,
            self.table()
        );
        let row: Option<MessageRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(editor_id)
            .bind(content)
            .bind(at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_write_error(e, id))?;

        match row {
            Some(row) => Message::try_from(row),
            None if self.get(id).await?.is_some() => Err(StoreError::NotSender {
                message_id: id.to_string(),
                user_id: editor_id.to_string(),
            }),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = $1", self.table()))
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>, limit: usize) -> StoreResult<u64> {
        let table = self.table();
        let sql = format!(
            r#"DELETE FROM {table} WHERE id IN (
                SELECT id FROM {table} WHERE "timestamp" < $1
                ORDER BY "timestamp" LIMIT $2
            )"#
        );
        let mut conn = acquire_with_metrics(&self.pool, POOL_METRICS_LABEL).await?;
        let result = sqlx::query(&sql)
            .bind(cutoff)
            .bind(limit as i64)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{IndexKey, DEFAULT_MESSAGE_TTL};

    #[test]
    fn ddl_covers_schema_table_registry_and_indexes() {
        let statements = ddl_statements(&Namespace::default(), DEFAULT_MESSAGE_TTL);
        assert_eq!(statements.len(), 3 + 8);
        assert_eq!(statements[0], "CREATE SCHEMA IF NOT EXISTS \"chat\"");
        assert!(statements[1].starts_with("CREATE TABLE IF NOT EXISTS \"chat\".\"messages\""));
        assert!(statements[2].contains(INDEX_REGISTRY));
        assert_eq!(
            statements[7],
            "CREATE INDEX IF NOT EXISTS \"idx_messages_recipient_id_asc_timestamp_desc\" \
             ON \"chat\".\"messages\" (\"recipient_id\" ASC, \"timestamp\" DESC)"
        );
    }

    #[test]
    fn table_ddl_enforces_contract() {
        let table = &collection_ddl(&Namespace::default(), &DocumentValidator::message())[1];
        assert!(table.contains("\"id\" TEXT PRIMARY KEY"));
        assert!(table.contains("\"sender_id\" TEXT NOT NULL"));
        assert!(table.contains("\"recipient_id\" TEXT,"));
        assert!(table.contains("\"timestamp\" TIMESTAMPTZ NOT NULL"));
        assert!(table.contains("\"content_type\" IN ('text', 'image', 'file')"));
        assert!(table.contains("\"read_by\" TEXT[] NOT NULL DEFAULT '{}'"));
        assert!(table.contains("\"is_edited\" BOOLEAN NOT NULL DEFAULT FALSE"));
        assert!(table.contains("num_nonnulls(recipient_id, group_id) = 1"));
        assert!(table.contains("edit_timestamp IS NULL OR is_edited"));
    }

    #[test]
    fn bare_table_lacks_every_check() {
        let validator = DocumentValidator::message();
        let missing = missing_checks("messages", &validator, &[]);
        assert_eq!(
            missing,
            vec![
                "content_type values check".to_string(),
                "messages_single_target".to_string(),
                "messages_edit_flag".to_string(),
            ]
        );

        let narrower = vec![(
            "messages_content_type_check".to_string(),
            "CHECK ((content_type = ANY (ARRAY['text'::text])))".to_string(),
        )];
        assert!(missing_checks("messages", &validator, &narrower)
            .contains(&"content_type values check".to_string()));
    }

    #[test]
    fn provisioned_constraints_satisfy_check() {
        let existing = vec![
            (
                "messages_content_type_check".to_string(),
                "CHECK ((content_type = ANY (ARRAY['text'::text, 'image'::text, 'file'::text])))"
                    .to_string(),
            ),
            (
                "messages_single_target".to_string(),
                "CHECK ((num_nonnulls(recipient_id, group_id) = 1))".to_string(),
            ),
            (
                "messages_edit_flag".to_string(),
                "CHECK (((edit_timestamp IS NULL) OR is_edited))".to_string(),
            ),
        ];
        assert!(missing_checks("messages", &DocumentValidator::message(), &existing).is_empty());
    }

    #[test]
    fn explain_walker_finds_nested_index_scans() {
        let plan = serde_json::json!({
            "Node Type": "Limit",
            "Plans": [{
                "Node Type": "Index Scan",
                "Index Name": "idx_messages_recipient_id_asc_timestamp_desc"
            }]
        });
        let mut names = Vec::new();
        let mut sorts = false;
        collect_plan(&plan, &mut names, &mut sorts);
        assert_eq!(names, vec!["idx_messages_recipient_id_asc_timestamp_desc"]);
        assert!(!sorts);
    }

    #[test]
    fn index_keys_render_with_direction() {
        let spec = IndexSpec::new(vec![IndexKey::asc("group_id"), IndexKey::desc("timestamp")]);
        assert!(index_ddl(&Namespace::default(), &spec)
            .ends_with("(\"group_id\" ASC, \"timestamp\" DESC)"));
    }
}
