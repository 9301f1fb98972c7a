// Normalisation des noms saisis par les utilisateurs

pub const USERNAME_MAX_LEN: usize = 20;

/// Caractères autorisés dans un nom d'utilisateur : [a-zA-Z0-9_-]
pub fn is_username_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Supprime tout caractère hors [a-zA-Z0-9_-] puis tronque à 20 caractères.
/// Appliquée à l'écriture ET à la lecture (login) pour que les deux formes coïncident.
pub fn sanitize_username(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| is_username_char(*c))
        .take(USERNAME_MAX_LEN)
        .collect()
}

/// Nom de module utilisable comme segment de chemin : `. # $ [ ] /` deviennent `_`
pub fn sanitize_module_name(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            '.' | '#' | '$' | '[' | ']' | '/' => '_',
            other => other,
        })
        .collect()
}

/// Nom descriptif réduit à un fragment sûr pour une clé de stockage
pub fn sanitize_storage_name(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| if is_username_char(c) { c } else { '_' })
        .collect();

    if cleaned.is_empty() {
        "fichier".to_string()
    } else {
        cleaned
    }
}

/// Taille lisible, base 1024 (ex: 1536 -> "1.5 KB")
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }

    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}
