// ============================================================================
// MODELS - MODULE PRINCIPAL
// ============================================================================
//
// Description:
//   Point d'entrée pour tous les modèles de données.
//   Les enregistrements vivent dans l'arbre clé/chemin (voir store/),
//   seul tree_node est une vraie table SeaORM.
//
// Liste des modules:
//   - health : Health check API
//   - dto : Data Transfer Objects pour les requêtes/réponses API
//   - users : Utilisateurs (users/{pushKey})
//   - resource : Cours/TD, modules et chemins (resources/...)
//   - seminar : Séminaires (resources/seminar/{pushKey})
//   - tree_node : Table des feuilles de l'arbre (PostgreSQL)
//
// ============================================================================

pub mod health;
pub mod dto;
pub mod users;
pub mod resource;
pub mod seminar;
pub mod tree_node;
