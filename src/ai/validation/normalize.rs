//! Field Normalization
//!
//! Maps alternative field names produced by models onto the canonical schema,
//! once, right after recovery. Downstream code only ever sees canonical keys.
//!
//! Two passes over every object, recursively:
//! 1. camelCase / kebab-case / spaced keys become snake_case
//! 2. known synonyms and localized names become their canonical key
//!
//! A rename never overwrites a canonical key that is already present.

use serde_json::{Map, Value};

/// Alternative name → canonical name
const ALIASES: &[(&str, &str)] = &[
    // collections
    ("personajes", "characters"),
    ("cast", "characters"),
    ("lugares", "locations"),
    ("ubicaciones", "locations"),
    ("places", "locations"),
    ("settings", "locations"),
    ("reglas", "world_rules"),
    ("rules", "world_rules"),
    ("objetos", "objects"),
    ("established_objects", "objects"),
    ("items", "objects"),
    ("cronologia", "timeline"),
    ("cronología", "timeline"),
    ("tramas", "plot_threads"),
    ("subplots", "plot_threads"),
    ("threads", "plot_threads"),
    ("capitulos", "outline"),
    ("capítulos", "outline"),
    ("chapter_outline", "outline"),
    ("chapters", "outline"),
    ("escenas", "scenes"),
    ("biblia", "world_bible"),
    ("bible", "world_bible"),
    ("parches", "patches"),
    ("edits", "patches"),
    ("problemas", "issues"),
    ("problems", "issues"),
    ("findings", "issues"),
    // fields
    ("nombre", "name"),
    ("titulo", "title"),
    ("título", "title"),
    ("resumen", "summary"),
    ("synopsis", "summary"),
    ("rol", "role"),
    ("papel", "role"),
    ("descripcion", "description"),
    ("descripción", "description"),
    ("numero", "number"),
    ("número", "number"),
    ("chapter_number", "number"),
    ("scene_number", "number"),
    ("estado", "status"),
    ("objetivo", "goal"),
    ("acto", "act"),
    ("ubicacion", "location"),
    ("ubicación", "location"),
    ("evento_clave", "key_event"),
    ("arco_emocional", "emotional_arc"),
    ("original_text", "original"),
    ("find", "original"),
    ("replace", "replacement"),
    ("replacement_text", "replacement"),
    ("logic", "logic_score"),
    ("style", "style_score"),
    ("tension", "tension_level"),
];

/// Keys that were renamed, as (from, to) pairs
pub type Renames = Vec<(String, String)>;

/// Normalize a recovered value in place
pub fn normalize(value: &mut Value) -> Renames {
    let mut renames = Vec::new();
    normalize_inner(value, &mut renames);
    renames
}

fn normalize_inner(value: &mut Value, renames: &mut Renames) {
    match value {
        Value::Object(map) => {
            let old = std::mem::take(map);
            *map = normalize_object(old, renames);
            for v in map.values_mut() {
                normalize_inner(v, renames);
            }
        }
        Value::Array(items) => {
            for v in items {
                normalize_inner(v, renames);
            }
        }
        _ => {}
    }
}

fn normalize_object(old: Map<String, Value>, renames: &mut Renames) -> Map<String, Value> {
    // Canonical spellings first so they win over aliases
    let mut entries: Vec<(String, String, Value)> = old
        .into_iter()
        .map(|(k, v)| {
            let canonical = canonical_key(&k);
            (k, canonical, v)
        })
        .collect();
    entries.sort_by_key(|(orig, canonical, _)| orig != canonical);

    let mut out = Map::with_capacity(entries.len());
    for (orig, canonical, v) in entries {
        if out.contains_key(&canonical) {
            // keep the alias under its own name rather than dropping data
            out.entry(orig).or_insert(v);
            continue;
        }
        if orig != canonical {
            renames.push((orig, canonical.clone()));
        }
        out.insert(canonical, v);
    }
    out
}

fn canonical_key(key: &str) -> String {
    let snake = to_snake_case(key);
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == snake)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(snake)
}

/// `keyEvent` → `key_event`, `Key Event` → `key_event`, `key-event` → `key_event`
fn to_snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut prev_lower = false;
    for ch in key.trim().chars() {
        if ch.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
            prev_lower = false;
        } else if ch == '-' || ch == ' ' {
            if !out.ends_with('_') {
                out.push('_');
            }
            prev_lower = false;
        } else {
            out.push(ch);
            prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_localized_keys() {
        let mut v = json!({
            "personajes": [{"nombre": "Mara", "rol": "protagonista"}],
            "capitulos": [{"numero": 1, "titulo": "Llegada", "keyEvent": "arrival"}]
        });
        let renames = normalize(&mut v);
        assert_eq!(v["characters"][0]["name"], "Mara");
        assert_eq!(v["characters"][0]["role"], "protagonista");
        assert_eq!(v["outline"][0]["number"], 1);
        assert_eq!(v["outline"][0]["key_event"], "arrival");
        let renamed = ("personajes".to_string(), "characters".to_string());
        assert!(renames.contains(&renamed));
    }

    #[test]
    fn test_canonical_key_wins() {
        let mut v = json!({"name": "Mara", "nombre": "Other"});
        normalize(&mut v);
        assert_eq!(v["name"], "Mara");
        assert_eq!(v["nombre"], "Other");
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(to_snake_case("emotionalArc"), "emotional_arc");
        assert_eq!(to_snake_case("Key Event"), "key_event");
        assert_eq!(to_snake_case("ending-hook"), "ending_hook");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
        assert_eq!(to_snake_case("sceneID"), "scene_id");
    }

    #[test]
    fn test_string_values_untouched() {
        let mut v = json!({"summary": "personajes arrive"});
        assert!(normalize(&mut v).is_empty());
        assert_eq!(v["summary"], "personajes arrive");
    }
}
