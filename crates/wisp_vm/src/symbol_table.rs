use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Global,
    Local,
    Builtin,
    Free,
    Function,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub scope: Scope,
    pub index: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    outer: Option<Box<SymbolTable>>,
    store: HashMap<String, Symbol>,
    pub free_symbols: Vec<Symbol>,
    num_definitions: usize,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_enclosed(outer: SymbolTable) -> Self {
        SymbolTable {
            outer: Some(Box::new(outer)),
            store: HashMap::new(),
            free_symbols: Vec::new(),
            num_definitions: 0,
        }
    }

    /// Discards this scope and returns the enclosing one, if any.
    pub fn pop(self) -> Option<SymbolTable> {
        self.outer.map(|b| *b)
    }

    /// Unwinds to the top-level (outer-most) table, discarding any
    /// still-open nested scopes left behind by a mid-scope compile error.
    pub fn into_outermost(mut self) -> SymbolTable {
        while let Some(outer) = self.outer {
            self = *outer;
        }
        self
    }

    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = if self.outer.is_none() { Scope::Global } else { Scope::Local };
        let symbol = Symbol { name: name.to_string(), scope, index: self.num_definitions };
        self.store.insert(name.to_string(), symbol.clone());
        self.num_definitions += 1;
        symbol
    }

    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol { name: name.to_string(), scope: Scope::Builtin, index };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    pub fn define_function_name(&mut self, name: &str) -> Symbol {
        let symbol = Symbol { name: name.to_string(), scope: Scope::Function, index: 0 };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    fn define_free(&mut self, original: Symbol) -> Symbol {
        self.free_symbols.push(original.clone());
        let symbol = Symbol { name: original.name, scope: Scope::Free, index: self.free_symbols.len() - 1 };
        self.store.insert(symbol.name.clone(), symbol.clone());
        symbol
    }

    pub fn num_definitions(&self) -> usize {
        self.num_definitions
    }

    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.store.get(name) {
            return Some(symbol.clone());
        }
        let outer = self.outer.as_mut()?;
        let resolved = outer.resolve(name)?;
        match resolved.scope {
            Scope::Global | Scope::Builtin => Some(resolved),
            _ => Some(self.define_free(resolved)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_define_resolve_global() {
        let mut table = SymbolTable::new();
        let a = table.define("a");
        assert_eq!(a, Symbol { name: "a".into(), scope: Scope::Global, index: 0 });
        assert_eq!(table.resolve("a"), Some(a));
    }

    #[test]
    fn t_resolve_local() {
        let mut global = SymbolTable::new();
        global.define("a");
        let mut local = SymbolTable::new_enclosed(global);
        local.define("b");
        assert_eq!(local.resolve("a").unwrap().scope, Scope::Global);
        assert_eq!(local.resolve("b").unwrap().scope, Scope::Local);
    }

    #[test]
    fn t_resolve_nested_local_promotes_to_free() {
        let mut global = SymbolTable::new();
        global.define("a");
        let mut first = SymbolTable::new_enclosed(global);
        first.define("b");
        let mut second = SymbolTable::new_enclosed(first);
        second.define("c");

        let a = second.resolve("a").unwrap();
        let b = second.resolve("b").unwrap();
        let c = second.resolve("c").unwrap();
        assert_eq!(a.scope, Scope::Global);
        assert_eq!(b.scope, Scope::Free);
        assert_eq!(b.index, 0);
        assert_eq!(c.scope, Scope::Local);
        assert_eq!(second.free_symbols.len(), 1);
        assert_eq!(second.free_symbols[0].name, "b");
    }

    #[test]
    fn t_resolve_unresolvable_returns_none() {
        let mut global = SymbolTable::new();
        global.define("a");
        assert_eq!(global.resolve("nope"), None);
    }

    #[test]
    fn t_define_and_resolve_function_name() {
        let mut table = SymbolTable::new();
        table.define_function_name("counter");
        let symbol = table.resolve("counter").unwrap();
        assert_eq!(symbol.scope, Scope::Function);
        assert_eq!(symbol.index, 0);
    }

    #[test]
    fn t_builtin_scope() {
        let mut table = SymbolTable::new();
        table.define_builtin(0, "len");
        let mut local = SymbolTable::new_enclosed(table);
        let symbol = local.resolve("len").unwrap();
        assert_eq!(symbol.scope, Scope::Builtin);
        assert_eq!(symbol.index, 0);
    }
}
