pub mod time;

/// Alphabet for generated ids: lowercase alphanumerics so ids stay readable in templates.
const ID_ALPHABET: [char; 36] = [
    'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', '0', '1', '2', '3', '4', '5', '6', '7', '8',
    '9',
];

/// Random 21 character id, used for run ids.
pub fn longid() -> String {
    nanoid::nanoid!(21, &ID_ALPHABET)
}

/// Node id in the editor's `<type>-<suffix>` format, e.g. `http_request-k3j9x0a2`.
pub fn node_id(node_type: &str) -> String {
    format!("{}-{}", node_type, nanoid::nanoid!(8, &ID_ALPHABET))
}

/// Edge id derived from its endpoints, e.g. `e-a-b`.
pub fn edge_id(
    source: &str,
    target: &str,
) -> String {
    format!("e-{}-{}", source, target)
}
