// connexion BD

use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr, Schema};
use tracing::info;

use crate::models::tree_node;

pub async fn establish_connection(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    Database::connect(database_url).await
}

/// Crée la table des feuilles si elle n'existe pas encore
pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut create = schema.create_table_from_entity(tree_node::Entity);
    create.if_not_exists();
    db.execute(backend.build(&create)).await?;

    info!("✅ Schema ready (tree_nodes_rust)");
    Ok(())
}
