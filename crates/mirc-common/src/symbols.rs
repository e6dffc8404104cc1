use std::collections::HashMap;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct VarId(pub usize);

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FuncId(pub usize);

/// Where the value of a variable lives when it is not in a register.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Storage {
    Global,
    Local { offset: i64 },

    /// The symbol of a callable function. Never a register candidate.
    Function(FuncId),
}

#[derive(Clone, Debug)]
pub struct Variable {
    pub name: String,
    pub storage: Storage,
    pub scope: Option<FuncId>,

    /// Set for values that may be address-aliased and must stay in memory.
    pub no_regalloc: bool,

    /// The physical register assigned by the allocator, if any.
    pub register: Option<u32>,
}

impl Variable {
    pub fn is_global(&self) -> bool {
        matches!(self.storage, Storage::Global)
    }

    pub fn is_function(&self) -> bool {
        matches!(self.storage, Storage::Function(_))
    }
}

#[derive(Clone, Debug)]
pub struct Function {
    pub name: String,
    pub args: usize,
    pub frame_size: u32,
    pub symbol: VarId,

    /// `false` for externally provided functions which have no body.
    pub defined: bool,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    vars: Vec<Variable>,
    funcs: Vec<Function>,

    globals: HashMap<String, VarId>,
    locals: HashMap<(FuncId, String), VarId>,
    functions: HashMap<String, FuncId>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_global(&mut self, name: impl Into<String>, no_regalloc: bool) -> VarId {
        let name = name.into();
        let id = self.push_var(Variable {
            name: name.clone(),
            storage: Storage::Global,
            scope: None,
            no_regalloc,
            register: None,
        });

        self.globals.insert(name, id);
        id
    }

    pub fn add_function(
        &mut self,
        name: impl Into<String>,
        args: usize,
        frame_size: u32,
        defined: bool,
    ) -> FuncId {
        let name = name.into();
        let func = FuncId(self.funcs.len());
        let symbol = self.push_var(Variable {
            name: name.clone(),
            storage: Storage::Function(func),
            scope: None,
            no_regalloc: true,
            register: None,
        });

        self.funcs.push(Function {
            name: name.clone(),
            args,
            frame_size,
            symbol,
            defined,
        });

        self.globals.insert(name.clone(), symbol);
        self.functions.insert(name, func);
        func
    }

    pub fn add_local(
        &mut self,
        func: FuncId,
        name: impl Into<String>,
        offset: i64,
        no_regalloc: bool,
    ) -> VarId {
        let name = name.into();
        let id = self.push_var(Variable {
            name: name.clone(),
            storage: Storage::Local { offset },
            scope: Some(func),
            no_regalloc,
            register: None,
        });

        self.locals.insert((func, name), id);
        id
    }

    /// Look a name up in the scope of `func`, falling back to the global scope.
    pub fn lookup(&self, func: Option<FuncId>, name: &str) -> Option<VarId> {
        func.and_then(|func| self.locals.get(&(func, name.to_string())).copied())
            .or_else(|| self.globals.get(name).copied())
    }

    pub fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.functions.get(name).copied()
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.funcs[id.0]
    }

    pub fn function_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.funcs[id.0]
    }

    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> + '_ {
        self.funcs
            .iter()
            .enumerate()
            .map(|(id, func)| (FuncId(id), func))
    }

    pub fn var(&self, id: VarId) -> &Variable {
        &self.vars[id.0]
    }

    pub fn var_mut(&mut self, id: VarId) -> &mut Variable {
        &mut self.vars[id.0]
    }

    pub fn vars(&self) -> impl Iterator<Item = (VarId, &Variable)> + '_ {
        self.vars.iter().enumerate().map(|(id, var)| (VarId(id), var))
    }

    /// All local variables declared in the scope of `func`, in declaration order.
    pub fn locals_of(&self, func: FuncId) -> impl Iterator<Item = (VarId, &Variable)> + '_ {
        self.vars().filter(move |(_, var)| var.scope == Some(func))
    }

    fn push_var(&mut self, var: Variable) -> VarId {
        let id = VarId(self.vars.len());
        self.vars.push(var);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locals_shadow_globals() {
        let mut symbols = SymbolTable::new();
        let global = symbols.add_global("x", false);
        let main = symbols.add_function("main", 0, 8, true);
        let local = symbols.add_local(main, "x", 4, false);

        assert_eq!(Some(local), symbols.lookup(Some(main), "x"));
        assert_eq!(Some(global), symbols.lookup(None, "x"));
    }

    #[test]
    fn functions_have_symbols() {
        let mut symbols = SymbolTable::new();
        let print = symbols.add_function("print", 1, 0, false);
        let symbol = symbols.lookup(None, "print").unwrap();

        assert_eq!(symbol, symbols.function(print).symbol);
        assert!(symbols.var(symbol).is_function());
        assert_eq!(Some(print), symbols.function_by_name("print"));
    }
}
