// ============================================================================
// STORE - ARBRE CLÉ/CHEMIN
// ============================================================================
//
// Description:
//   Abstraction d'une base "arbre JSON" : chaque noeud est adressé par un
//   chemin `a/b/c`. Seules les feuilles (valeurs scalaires) sont persistées,
//   donc un objet vide ou `null` disparaît de l'arbre. C'est pour cela qu'un
//   module vide garde un marqueur `_placeholder: true`.
//
// Backends:
//   - memory   : BTreeMap en mémoire (dev, tests)
//   - postgres : une ligne par feuille dans `tree_nodes_rust` (SeaORM)
//
// Points d'attention:
//   - write() remplace tout le sous-arbre, update() fusionne champ par champ
//   - les tableaux sont stockés avec des clés d'index et relus comme objets
//   - dernier écrivain gagne, aucun verrou entre sessions
//
// ============================================================================

pub mod memory;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rand::Rng;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use crate::error::AppResult;

/// Chemin typé dans l'arbre (segments sans `/`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TreePath(Vec<String>);

impl TreePath {
    pub fn root() -> Self {
        TreePath(Vec::new())
    }

    pub fn parse(raw: &str) -> Self {
        TreePath(
            raw.split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        TreePath(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Clé de stockage `a/b/c` (vide pour la racine)
    pub fn key(&self) -> String {
        self.0.join("/")
    }

    /// Vrai si `other` est ce chemin ou un de ses descendants
    pub fn contains(&self, other: &TreePath) -> bool {
        other.0.len() >= self.0.len() && other.0[..self.0.len()] == self.0[..]
    }

    /// Clés des ancêtres stricts, hors racine
    pub fn ancestor_keys(&self) -> Vec<String> {
        (1..self.0.len()).map(|n| self.0[..n].join("/")).collect()
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.key())
    }
}

#[async_trait]
pub trait TreeStore: Send + Sync {
    /// Lit le sous-arbre à `path`, `None` s'il n'existe pas
    async fn read(&self, path: &TreePath) -> AppResult<Option<Value>>;

    /// Remplace tout le sous-arbre à `path` (`null` ou objet vide = suppression)
    async fn write(&self, path: &TreePath, value: Value) -> AppResult<()>;

    /// Supprime le sous-arbre à `path`
    async fn delete(&self, path: &TreePath) -> AppResult<()>;

    /// Abonnement aux chemins modifiés (un message par écriture)
    fn subscribe(&self) -> broadcast::Receiver<TreePath>;

    /// Nouvelle clé opaque, ordonnée dans le temps
    fn push_key(&self) -> String;

    /// Nom du backend, exposé par /api/health
    fn backend(&self) -> &'static str;

    /// Fusion partielle : seuls les champs fournis sont écrits, `null` supprime le champ
    async fn update(&self, path: &TreePath, fields: Map<String, Value>) -> AppResult<()> {
        for (field, value) in fields {
            self.write(&path.child(field), value).await?;
        }
        Ok(())
    }

    /// Clés des enfants directs, dans l'ordre d'énumération
    async fn list_children(&self, path: &TreePath) -> AppResult<Vec<String>> {
        Ok(match self.read(path).await? {
            Some(Value::Object(map)) => map.keys().cloned().collect(),
            _ => Vec::new(),
        })
    }
}

/// Vrai si la feuille `leaf_key` se trouve sous `prefix` (ou est `prefix`)
pub(crate) fn is_within(prefix: &str, leaf_key: &str) -> bool {
    prefix.is_empty()
        || leaf_key == prefix
        || (leaf_key.len() > prefix.len()
            && leaf_key.starts_with(prefix)
            && leaf_key.as_bytes()[prefix.len()] == b'/')
}

/// Décompose une valeur JSON en feuilles `(clé, scalaire)`
pub(crate) fn flatten(path: &TreePath, value: &Value, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (field, child) in map {
                flatten(&path.child(field.clone()), child, out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten(&path.child(index.to_string()), child, out);
            }
        }
        scalar => out.push((path.key(), scalar.clone())),
    }
}

/// Reconstruit le sous-arbre `path` à partir de ses feuilles
pub(crate) fn assemble<I>(path: &TreePath, leaves: I) -> Option<Value>
where
    I: IntoIterator<Item = (String, Value)>,
{
    let depth = path.segments().len();
    let mut root: Option<Value> = None;

    for (leaf_key, value) in leaves {
        let leaf = TreePath::parse(&leaf_key);
        let relative = &leaf.segments()[depth..];

        if relative.is_empty() {
            // feuille exactement au chemin demandé
            return Some(value);
        }

        insert_at(root.get_or_insert(Value::Null), relative, value);
    }

    root
}

fn insert_at(node: &mut Value, segments: &[String], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return;
    };

    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let child = map.entry(head.clone()).or_insert(Value::Null);
        insert_at(child, rest, value);
    }
}

const PUSH_CHARS: &[u8] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

/// Générateur de clés push : 8 caractères d'horodatage + 12 aléatoires.
/// Dans la même milliseconde, la partie aléatoire est incrémentée pour garder l'ordre.
#[derive(Default)]
pub struct PushKeyGenerator {
    last: Mutex<(i64, [u8; 12])>,
}

impl PushKeyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_key(&self) -> String {
        let now = Utc::now().timestamp_millis();
        let mut last = self.last.lock();

        if now == last.0 {
            // incrément avec retenue
            for digit in last.1.iter_mut().rev() {
                if *digit < 63 {
                    *digit += 1;
                    break;
                }
                *digit = 0;
            }
        } else {
            last.0 = now;
            let mut rng = rand::thread_rng();
            for digit in last.1.iter_mut() {
                *digit = rng.gen_range(0..64);
            }
        }

        let mut key = String::with_capacity(20);
        let mut time = now;
        let mut time_chars = [0u8; 8];
        for slot in time_chars.iter_mut().rev() {
            *slot = PUSH_CHARS[(time % 64) as usize];
            time /= 64;
        }
        key.extend(time_chars.iter().map(|b| *b as char));
        key.extend(last.1.iter().map(|d| PUSH_CHARS[*d as usize] as char));
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tree_path_parse_and_display() {
        let path = TreePath::parse("/resources//cours/year3/");
        assert_eq!(path.segments().len(), 3);
        assert_eq!(path.key(), "resources/cours/year3");
        assert_eq!(path.to_string(), "/resources/cours/year3");
        assert_eq!(path.last(), Some("year3"));
        assert!(TreePath::parse("").is_root());
    }

    #[test]
    fn test_tree_path_contains() {
        let parent = TreePath::parse("resources/cours");
        assert!(parent.contains(&TreePath::parse("resources/cours/year3/M")));
        assert!(parent.contains(&parent));
        assert!(!parent.contains(&TreePath::parse("resources/td")));
        assert!(TreePath::root().contains(&parent));
    }

    #[test]
    fn test_is_within_respects_segment_boundaries() {
        assert!(is_within("users/a", "users/a/name"));
        assert!(is_within("users/a", "users/a"));
        assert!(!is_within("users/a", "users/ab/name"));
        assert!(is_within("", "anything"));
    }

    #[test]
    fn test_flatten_then_assemble_keeps_nested_shape() {
        let path = TreePath::parse("resources/cours/year3/Gestion");
        let value = json!({
            "_placeholder": true,
            "k1": { "id": "k1", "type": "link", "meta": { "n": 2 } },
            "empty": {},
            "gone": null
        });

        let mut leaves = Vec::new();
        flatten(&path, &value, &mut leaves);
        assert_eq!(leaves.len(), 4);

        let rebuilt = assemble(&path, leaves).unwrap();
        assert_eq!(
            rebuilt,
            json!({
                "_placeholder": true,
                "k1": { "id": "k1", "type": "link", "meta": { "n": 2 } }
            })
        );
    }

    #[test]
    fn test_assemble_scalar_leaf() {
        let path = TreePath::parse("users/a/role");
        let rebuilt = assemble(&path, vec![("users/a/role".to_string(), json!("admin"))]);
        assert_eq!(rebuilt, Some(json!("admin")));
        assert_eq!(assemble(&path, Vec::new()), None);
    }

    #[test]
    fn test_push_keys_are_ordered_and_unique() {
        let generator = PushKeyGenerator::new();
        let keys: Vec<String> = (0..200).map(|_| generator.next_key()).collect();

        for pair in keys.windows(2) {
            assert!(pair[0] < pair[1], "{} !< {}", pair[0], pair[1]);
        }
        assert!(keys.iter().all(|k| k.len() == 20));
    }
}
