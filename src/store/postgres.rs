// Backend PostgreSQL : une ligne par feuille (chemin, valeur JSON)

use async_trait::async_trait;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, QueryFilter, QueryOrder, TransactionTrait, sea_query::LikeExpr,
};
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use super::{PushKeyGenerator, TreePath, TreeStore, assemble, flatten, is_within};
use crate::error::AppResult;
use crate::models::tree_node::{self, Entity as TreeNode};

const EVENT_CAPACITY: usize = 256;

/// Motif LIKE "commence par", avec `\` `%` `_` échappés
fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

pub struct SeaOrmTreeStore {
    db: DatabaseConnection,
    events: broadcast::Sender<TreePath>,
    keys: PushKeyGenerator,
}

impl SeaOrmTreeStore {
    pub fn new(db: DatabaseConnection) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            db,
            events,
            keys: PushKeyGenerator::new(),
        }
    }

    /// Feuilles sous `path`, filtrées exactement en Rust derrière le LIKE
    async fn leaves_under<C: ConnectionTrait>(
        conn: &C,
        path: &TreePath,
    ) -> Result<Vec<tree_node::Model>, DbErr> {
        let prefix = path.key();
        let mut query = TreeNode::find().order_by_asc(tree_node::Column::Path);

        if !prefix.is_empty() {
            let child_prefix = format!("{}/", prefix);
            query = query.filter(
                Condition::any()
                    .add(tree_node::Column::Path.eq(prefix.clone()))
                    .add(tree_node::Column::Path.like(LikeExpr::new(like_prefix(&child_prefix)).escape('\\'))),
            );
        }

        let rows = query.all(conn).await?;
        Ok(rows
            .into_iter()
            .filter(|row| is_within(&prefix, &row.path))
            .collect())
    }

    async fn remove_keys<C: ConnectionTrait>(conn: &C, keys: Vec<String>) -> Result<(), DbErr> {
        if keys.is_empty() {
            return Ok(());
        }
        TreeNode::delete_many()
            .filter(tree_node::Column::Path.is_in(keys))
            .exec(conn)
            .await?;
        Ok(())
    }

    async fn replace<C: ConnectionTrait>(conn: &C, path: &TreePath, value: &Value) -> Result<(), DbErr> {
        let mut doomed: Vec<String> = Self::leaves_under(conn, path)
            .await?
            .into_iter()
            .map(|row| row.path)
            .collect();
        doomed.extend(path.ancestor_keys());
        Self::remove_keys(conn, doomed).await?;

        let mut flat = Vec::new();
        flatten(path, value, &mut flat);
        if flat.is_empty() {
            return Ok(());
        }

        let rows = flat.into_iter().map(|(key, leaf)| tree_node::ActiveModel {
            path: Set(key),
            value: Set(leaf),
        });
        TreeNode::insert_many(rows).exec(conn).await?;
        Ok(())
    }

    fn notify(&self, path: &TreePath) {
        let _ = self.events.send(path.clone());
    }
}

#[async_trait]
impl TreeStore for SeaOrmTreeStore {
    async fn read(&self, path: &TreePath) -> AppResult<Option<Value>> {
        let rows = Self::leaves_under(&self.db, path).await?;
        Ok(assemble(path, rows.into_iter().map(|row| (row.path, row.value))))
    }

    async fn write(&self, path: &TreePath, value: Value) -> AppResult<()> {
        let txn = self.db.begin().await?;
        Self::replace(&txn, path, &value).await?;
        txn.commit().await?;

        self.notify(path);
        Ok(())
    }

    async fn delete(&self, path: &TreePath) -> AppResult<()> {
        let keys = Self::leaves_under(&self.db, path)
            .await?
            .into_iter()
            .map(|row| row.path)
            .collect();
        Self::remove_keys(&self.db, keys).await?;

        self.notify(path);
        Ok(())
    }

    async fn update(&self, path: &TreePath, fields: Map<String, Value>) -> AppResult<()> {
        let txn = self.db.begin().await?;
        for (field, value) in &fields {
            Self::replace(&txn, &path.child(field.clone()), value).await?;
        }
        txn.commit().await?;

        self.notify(path);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<TreePath> {
        self.events.subscribe()
    }

    fn push_key(&self) -> String {
        self.keys.next_key()
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
