// ============================================================================
// MODÈLE : TREE NODES
// ============================================================================
//
// Table tree_nodes_rust : une ligne par feuille de l'arbre.
//   - path  (VARCHAR, PRIMARY KEY) - "resources/cours/year3/Module/-Nk1/url"
//   - value (JSONB, NOT NULL)      - scalaire JSON
//
// Les objets intermédiaires ne sont jamais stockés : ils sont reconstruits
// à la lecture à partir des chemins.
//
// ============================================================================

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tree_nodes_rust")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub path: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub value: Json,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
