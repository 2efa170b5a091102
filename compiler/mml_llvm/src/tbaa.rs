//! TBAA and alias-scope metadata registry.
//!
//! Every MML type name gets a distinct TBAA scalar node under one root;
//! every native struct gets a struct node carrying `(field, offset)` pairs
//! with C-rule offsets. Loads and stores additionally carry `!alias.scope`
//! and `!noalias` metadata so aliasing facts survive across
//! identical-layout nominal types.
//!
//! Node ids are handed out during emission; [`TbaaRegistry::render`]
//! materializes the `!N = ...` lines at the end of the module.

use rustc_hash::FxHashMap;

#[derive(Debug)]
pub struct TbaaRegistry {
    next_id: u32,
    root: u32,
    domain: u32,
    scalars: FxHashMap<String, u32>,
    structs: FxHashMap<String, u32>,
    access_tags: FxHashMap<(u32, u32, u64), u32>,
    scopes: FxHashMap<String, (u32, u32)>,
    /// `noalias` lists are filled at render time, once all types are known.
    noalias_pending: FxHashMap<String, u32>,
    lines: Vec<(u32, String)>,
}

impl Default for TbaaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TbaaRegistry {
    pub fn new() -> Self {
        let mut registry = TbaaRegistry {
            next_id: 0,
            root: 0,
            domain: 0,
            scalars: FxHashMap::default(),
            structs: FxHashMap::default(),
            access_tags: FxHashMap::default(),
            scopes: FxHashMap::default(),
            noalias_pending: FxHashMap::default(),
            lines: Vec::new(),
        };
        registry.root = registry.push("!{!\"mml-tbaa-root\"}".to_string());
        let domain = registry.alloc();
        registry
            .lines
            .push((domain, format!("distinct !{{!{domain}, !\"mml.alias.domain\"}}")));
        registry.domain = domain;
        registry
    }

    fn alloc(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn push(&mut self, body: String) -> u32 {
        let id = self.alloc();
        self.lines.push((id, body));
        id
    }

    /// Scalar TBAA node for an MML type name.
    pub fn scalar(&mut self, name: &str) -> u32 {
        if let Some(id) = self.scalars.get(name) {
            return *id;
        }
        let root = self.root;
        let id = self.push(format!("!{{!\"{name}\", !{root}, i64 0}}"));
        self.scalars.insert(name.to_string(), id);
        id
    }

    /// Struct TBAA node from `(field node, byte offset)` pairs.
    pub fn struct_node(&mut self, name: &str, fields: &[(u32, u64)]) -> u32 {
        if let Some(id) = self.structs.get(name) {
            return *id;
        }
        let mut body = format!("!{{!\"{name}\"");
        for (node, offset) in fields {
            body.push_str(&format!(", !{node}, i64 {offset}"));
        }
        body.push('}');
        let id = self.push(body);
        self.structs.insert(name.to_string(), id);
        id
    }

    /// Access tag `(base, access, offset)`.
    pub fn access_tag(&mut self, base: u32, access: u32, offset: u64) -> u32 {
        if let Some(id) = self.access_tags.get(&(base, access, offset)) {
            return *id;
        }
        let id = self.push(format!("!{{!{base}, !{access}, i64 {offset}}}"));
        self.access_tags.insert((base, access, offset), id);
        id
    }

    /// Scalar access tag for a non-aggregate load/store.
    pub fn scalar_tag(&mut self, name: &str) -> u32 {
        let node = self.scalar(name);
        self.access_tag(node, node, 0)
    }

    /// `(alias.scope list, noalias list)` ids for a type name.
    pub fn alias_scopes(&mut self, name: &str) -> (u32, u32) {
        if let (Some((_, list)), Some(noalias)) =
            (self.scopes.get(name), self.noalias_pending.get(name))
        {
            return (*list, *noalias);
        }
        let domain = self.domain;
        let scope = self.alloc();
        self.lines
            .push((scope, format!("distinct !{{!{scope}, !{domain}, !\"{name}\"}}")));
        let list = self.push(format!("!{{!{scope}}}"));
        self.scopes.insert(name.to_string(), (scope, list));
        let noalias = self.alloc();
        self.noalias_pending.insert(name.to_string(), noalias);
        (list, noalias)
    }

    /// Attachment suffix for a load/store of a struct field.
    pub fn field_attachment(&mut self, struct_name: &str, tag: u32) -> String {
        let (scope, noalias) = self.alias_scopes(struct_name);
        format!(", !tbaa !{tag}, !alias.scope !{scope}, !noalias !{noalias}")
    }

    /// Attachment suffix for a scalar load/store.
    pub fn scalar_attachment(&mut self, type_name: &str) -> String {
        let tag = self.scalar_tag(type_name);
        format!(", !tbaa !{tag}")
    }

    /// Render all metadata lines, filling the deferred `noalias` lists with
    /// every *other* type's scope.
    pub fn render(&self) -> Vec<String> {
        let mut lines = self.lines.clone();
        for (name, id) in &self.noalias_pending {
            let others: Vec<String> = self
                .scopes
                .iter()
                .filter(|(other, _)| *other != name)
                .map(|(_, (scope, _))| format!("!{scope}"))
                .collect();
            lines.push((*id, format!("!{{{}}}", others.join(", "))));
        }
        lines.sort_by_key(|(id, _)| *id);
        lines
            .into_iter()
            .map(|(id, body)| format!("!{id} = {body}"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_nodes_are_interned() {
        let mut registry = TbaaRegistry::new();
        let a = registry.scalar("Int");
        let b = registry.scalar("Int");
        assert_eq!(a, b);
        assert_ne!(registry.scalar("Bool"), a);
    }

    #[test]
    fn struct_nodes_carry_offsets() {
        let mut registry = TbaaRegistry::new();
        let int_node = registry.scalar("Int");
        let ptr_node = registry.scalar("CharPtr");
        let string = registry.struct_node(
            "String",
            &[(int_node, 0), (ptr_node, 8), (int_node, 16)],
        );
        let rendered = registry.render();
        let line = rendered
            .iter()
            .find(|l| l.starts_with(&format!("!{string} =")))
            .unwrap();
        assert!(line.contains("i64 8"));
        assert!(line.contains("i64 16"));
    }

    #[test]
    fn noalias_lists_cover_the_other_types() {
        let mut registry = TbaaRegistry::new();
        let (string_scope, string_noalias) = registry.alias_scopes("String");
        let (buffer_scope, _) = registry.alias_scopes("Buffer");
        assert_ne!(string_scope, buffer_scope);
        let rendered = registry.render();
        let noalias_line = rendered
            .iter()
            .find(|l| l.starts_with(&format!("!{string_noalias} =")))
            .unwrap();
        // String's noalias list names Buffer's scope, not its own.
        let (buffer_scope_node, _) = registry.scopes["Buffer"];
        assert!(noalias_line.contains(&format!("!{buffer_scope_node}")));
    }

    #[test]
    fn ids_render_in_order() {
        let mut registry = TbaaRegistry::new();
        registry.scalar("Int");
        registry.scalar_tag("Bool");
        let rendered = registry.render();
        let ids: Vec<u32> = rendered
            .iter()
            .map(|l| l[1..l.find(' ').unwrap()].parse().unwrap())
            .collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
    }
}
