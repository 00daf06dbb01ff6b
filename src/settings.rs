pub struct Settings {
    pub max_children: usize, // per container; the rest is replaced by a single "..." child
    pub max_list_nodes: usize, // per linked list walk direction
    pub max_string_len: usize, // bytes read when looking for a C string terminator
    pub max_encoded_len: usize, // largest synthetic payload we agree to parse
    pub max_depth: usize, // text formatter recursion limit
    pub page_size: usize, // memory cache granularity
}

impl Default for Settings {
    fn default() -> Self { Settings {
        max_children: 10000,
        max_list_nodes: 100000,
        max_string_len: 4096,
        max_encoded_len: 1 << 20,
        max_depth: 8,
        page_size: 4096,
    } }
}
