//! Conformance test scripts: module definitions, actions and assertions.
//!
//! A script is a flat list of [`Command`]s run top to bottom by an external
//! executor. Modules embedded in assertions may be deliberately malformed, so
//! binary and quoted modules are kept as raw bytes until [`ScriptModule::force`]
//! is called.

use crate::error::ReadError;
use crate::ir::{Binding, BindingHash, Const, Index, Location, Module, Var, INVALID_INDEX};
use crate::reader;
use crate::ReadOptions;
use log::debug;
use std::fmt;

/// Undecoded module content together with where it was written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawModule {
    pub loc: Location,
    pub name: Option<String>,
    pub data: Vec<u8>,
}

impl RawModule {
    pub fn new(loc: Location, data: impl Into<Vec<u8>>) -> Self {
        Self {
            loc,
            name: None,
            data: data.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A module as it appears in a script.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptModule {
    /// Already parsed.
    Text(Box<Module>),
    /// Binary bytes, decoded on demand.
    Binary(RawModule),
    /// Module text, assembled on demand.
    Quoted(RawModule),
}

impl ScriptModule {
    /// Where the module was written. Deferred modules report their own
    /// location without being parsed.
    pub fn location(&self) -> &Location {
        match self {
            ScriptModule::Text(module) => &module.loc,
            ScriptModule::Binary(raw) | ScriptModule::Quoted(raw) => &raw.loc,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            ScriptModule::Text(module) => module.name.as_deref(),
            ScriptModule::Binary(raw) | ScriptModule::Quoted(raw) => raw.name.as_deref(),
        }
    }

    /// Whether the content still has to be read before use.
    pub fn is_deferred(&self) -> bool {
        !matches!(self, ScriptModule::Text(_))
    }

    /// Produce the module, reading deferred content now.
    ///
    /// Quoted text that is not a complete `(module ...)` is taken as a list
    /// of module fields. The result carries the script location and name.
    pub fn force(&self, options: &ReadOptions) -> Result<Module, ReadError> {
        let (raw, result) = match self {
            ScriptModule::Text(module) => return Ok(module.as_ref().clone()),
            ScriptModule::Binary(raw) => {
                debug!("forcing binary module at {}", raw.loc);
                let result = reader::read_binary_named(&raw.data, raw.loc.filename.clone(), options)
                    .map_err(|err| ReadError::binary(&raw.loc, &err));
                (raw, result)
            }
            ScriptModule::Quoted(raw) => {
                debug!("forcing quoted module at {}", raw.loc);
                let result = quoted_text(&raw.data)
                    .and_then(|text| {
                        reader::read_text_named(&text, raw.loc.filename.clone(), options)
                    })
                    .map_err(|err| ReadError::text(&raw.loc, &err));
                (raw, result)
            }
        };

        let mut module = result?;
        module.loc = raw.loc.clone();
        if raw.name.is_some() {
            module.name = raw.name.clone();
        }
        Ok(module)
    }
}

impl From<Module> for ScriptModule {
    fn from(module: Module) -> Self {
        ScriptModule::Text(Box::new(module))
    }
}

fn quoted_text(data: &[u8]) -> anyhow::Result<String> {
    let text = std::str::from_utf8(data)
        .map_err(|err| anyhow::anyhow!("quoted module is not valid UTF-8: {}", err))?;
    if text.trim_start().starts_with("(module") {
        Ok(text.to_string())
    } else {
        Ok(format!("(module {})", text))
    }
}

/// What an action does with the export it names.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    /// Call an exported function.
    Invoke { args: Vec<Const> },
    /// Read an exported global.
    Get,
}

/// An invocation or export read against a script module.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub loc: Location,
    /// Target module. Left as the invalid index to mean "the most recently
    /// defined module"; [`Script::append_command`] fills it in.
    pub module_var: Var,
    /// Export name.
    pub name: String,
    pub kind: ActionKind,
}

impl Action {
    pub fn invoke(name: impl Into<String>, args: Vec<Const>) -> Self {
        Self {
            loc: Location::default(),
            module_var: Var::default(),
            name: name.into(),
            kind: ActionKind::Invoke { args },
        }
    }

    pub fn get(name: impl Into<String>) -> Self {
        Self {
            loc: Location::default(),
            module_var: Var::default(),
            name: name.into(),
            kind: ActionKind::Get,
        }
    }

    pub fn with_module(mut self, module_var: Var) -> Self {
        self.module_var = module_var;
        self
    }

    pub fn with_loc(mut self, loc: Location) -> Self {
        self.loc = loc;
        self
    }
}

/// One script command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Module(ScriptModule),
    Action(Action),
    /// Make a module's exports importable under `module_name`.
    Register {
        module_name: String,
        var: Var,
    },
    AssertMalformed {
        module: ScriptModule,
        text: String,
    },
    AssertInvalid {
        module: ScriptModule,
        text: String,
    },
    /// Like `AssertInvalid`, but only checked for non-binary modules.
    AssertInvalidNonBinary {
        module: ScriptModule,
        text: String,
    },
    AssertUnlinkable {
        module: ScriptModule,
        text: String,
    },
    AssertUninstantiable {
        module: ScriptModule,
        text: String,
    },
    AssertReturn {
        action: Action,
        expected: Vec<Const>,
    },
    AssertReturnCanonicalNan {
        action: Action,
    },
    AssertReturnArithmeticNan {
        action: Action,
    },
    AssertTrap {
        action: Action,
        text: String,
    },
    AssertExhaustion {
        action: Action,
        text: String,
    },
}

/// Fieldless discriminant of [`Command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandType {
    Module,
    Action,
    Register,
    AssertMalformed,
    AssertInvalid,
    AssertInvalidNonBinary,
    AssertUnlinkable,
    AssertUninstantiable,
    AssertReturn,
    AssertReturnCanonicalNan,
    AssertReturnArithmeticNan,
    AssertTrap,
    AssertExhaustion,
}

impl CommandType {
    pub const ALL: [CommandType; 13] = [
        CommandType::Module,
        CommandType::Action,
        CommandType::Register,
        CommandType::AssertMalformed,
        CommandType::AssertInvalid,
        CommandType::AssertInvalidNonBinary,
        CommandType::AssertUnlinkable,
        CommandType::AssertUninstantiable,
        CommandType::AssertReturn,
        CommandType::AssertReturnCanonicalNan,
        CommandType::AssertReturnArithmeticNan,
        CommandType::AssertTrap,
        CommandType::AssertExhaustion,
    ];

    pub const COUNT: usize = Self::ALL.len();

    /// Script keyword, e.g. `assert_return`.
    pub fn keyword(&self) -> &'static str {
        match self {
            CommandType::Module => "module",
            CommandType::Action => "action",
            CommandType::Register => "register",
            CommandType::AssertMalformed => "assert_malformed",
            CommandType::AssertInvalid => "assert_invalid",
            CommandType::AssertInvalidNonBinary => "assert_invalid_non_binary",
            CommandType::AssertUnlinkable => "assert_unlinkable",
            CommandType::AssertUninstantiable => "assert_uninstantiable",
            CommandType::AssertReturn => "assert_return",
            CommandType::AssertReturnCanonicalNan => "assert_return_canonical_nan",
            CommandType::AssertReturnArithmeticNan => "assert_return_arithmetic_nan",
            CommandType::AssertTrap => "assert_trap",
            CommandType::AssertExhaustion => "assert_exhaustion",
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl Command {
    pub fn ty(&self) -> CommandType {
        match self {
            Command::Module(_) => CommandType::Module,
            Command::Action(_) => CommandType::Action,
            Command::Register { .. } => CommandType::Register,
            Command::AssertMalformed { .. } => CommandType::AssertMalformed,
            Command::AssertInvalid { .. } => CommandType::AssertInvalid,
            Command::AssertInvalidNonBinary { .. } => CommandType::AssertInvalidNonBinary,
            Command::AssertUnlinkable { .. } => CommandType::AssertUnlinkable,
            Command::AssertUninstantiable { .. } => CommandType::AssertUninstantiable,
            Command::AssertReturn { .. } => CommandType::AssertReturn,
            Command::AssertReturnCanonicalNan { .. } => CommandType::AssertReturnCanonicalNan,
            Command::AssertReturnArithmeticNan { .. } => CommandType::AssertReturnArithmeticNan,
            Command::AssertTrap { .. } => CommandType::AssertTrap,
            Command::AssertExhaustion { .. } => CommandType::AssertExhaustion,
        }
    }

    /// The action this command runs, if any.
    pub fn action(&self) -> Option<&Action> {
        match self {
            Command::Action(action)
            | Command::AssertReturn { action, .. }
            | Command::AssertReturnCanonicalNan { action }
            | Command::AssertReturnArithmeticNan { action }
            | Command::AssertTrap { action, .. }
            | Command::AssertExhaustion { action, .. } => Some(action),
            _ => None,
        }
    }

    fn action_mut(&mut self) -> Option<&mut Action> {
        match self {
            Command::Action(action)
            | Command::AssertReturn { action, .. }
            | Command::AssertReturnCanonicalNan { action }
            | Command::AssertReturnArithmeticNan { action }
            | Command::AssertTrap { action, .. }
            | Command::AssertExhaustion { action, .. } => Some(action),
            _ => None,
        }
    }

    /// The module this command defines or asserts on, if any.
    pub fn script_module(&self) -> Option<&ScriptModule> {
        match self {
            Command::Module(module)
            | Command::AssertMalformed { module, .. }
            | Command::AssertInvalid { module, .. }
            | Command::AssertInvalidNonBinary { module, .. }
            | Command::AssertUnlinkable { module, .. }
            | Command::AssertUninstantiable { module, .. } => Some(module),
            _ => None,
        }
    }

    /// Expected failure text of an assertion, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Command::AssertMalformed { text, .. }
            | Command::AssertInvalid { text, .. }
            | Command::AssertInvalidNonBinary { text, .. }
            | Command::AssertUnlinkable { text, .. }
            | Command::AssertUninstantiable { text, .. }
            | Command::AssertTrap { text, .. }
            | Command::AssertExhaustion { text, .. } => Some(text),
            _ => None,
        }
    }
}

/// An ordered list of commands plus the names of the modules they define.
///
/// A module var resolves to the index of the defining command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    commands: Vec<Command>,
    module_bindings: BindingHash,
    last_module: Option<Index>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command and return its index.
    ///
    /// A named module command is bound to its index. An action or `register`
    /// whose module var is still the invalid index is pointed at the most
    /// recently defined module; before any module exists it is left as is.
    pub fn append_command(&mut self, mut command: Command) -> Index {
        let index = self.commands.len() as Index;

        if let Command::Module(module) = &command {
            if let Some(name) = module.name() {
                self.module_bindings
                    .insert(name, Binding::new(module.location().clone(), index));
            }
            self.last_module = Some(index);
        } else if let Some(last) = self.last_module {
            let var = match &mut command {
                Command::Register { var, .. } => Some(var),
                other => other.action_mut().map(|action| &mut action.module_var),
            };
            if let Some(var) = var.filter(|var| var.as_index() == Some(INVALID_INDEX)) {
                var.kind = Var::index(last).kind;
            }
        }

        debug!("append {} command #{}", command.ty(), index);
        self.commands.push(command);
        index
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn module_bindings(&self) -> &BindingHash {
        &self.module_bindings
    }

    /// The first module defined by a `module` command.
    pub fn first_module(&self) -> Option<&ScriptModule> {
        self.commands.iter().find_map(|command| match command {
            Command::Module(module) => Some(module),
            _ => None,
        })
    }

    /// Index of the most recent `module` command.
    pub fn last_module_index(&self) -> Option<Index> {
        self.last_module
    }

    /// Module defined by the command `var` refers to, by name or by index.
    pub fn get_module(&self, var: &Var) -> Option<&ScriptModule> {
        let index = self.module_bindings.find_index(var);
        match self.commands.get(index as usize)? {
            Command::Module(module) => Some(module),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_module(name: Option<&str>) -> ScriptModule {
        let mut module = Module::new();
        module.name = name.map(str::to_string);
        ScriptModule::from(module)
    }

    #[test]
    fn test_command_type_keywords() {
        assert_eq!(CommandType::COUNT, 13);
        assert_eq!(CommandType::AssertReturn.to_string(), "assert_return");
        assert_eq!(
            CommandType::AssertReturnArithmeticNan.to_string(),
            "assert_return_arithmetic_nan"
        );
        let keywords: std::collections::HashSet<_> =
            CommandType::ALL.iter().map(|ty| ty.keyword()).collect();
        assert_eq!(keywords.len(), CommandType::COUNT);
    }

    #[test]
    fn test_command_ty_and_accessors() {
        let command = Command::AssertTrap {
            action: Action::invoke("div", vec![Const::i32(1), Const::i32(0)]),
            text: "integer divide by zero".to_string(),
        };
        assert_eq!(command.ty(), CommandType::AssertTrap);
        assert_eq!(command.action().map(|a| a.name.as_str()), Some("div"));
        assert_eq!(command.text(), Some("integer divide by zero"));
        assert!(command.script_module().is_none());

        let command = Command::AssertInvalid {
            module: text_module(None),
            text: "type mismatch".to_string(),
        };
        assert!(command.action().is_none());
        assert!(command.script_module().is_some());
    }

    #[test]
    fn test_module_names_bind_to_command_index() {
        let mut script = Script::new();
        script.append_command(Command::Module(text_module(Some("$a"))));
        script.append_command(Command::Action(Action::get("g")));
        let b = script.append_command(Command::Module(text_module(Some("$b"))));

        assert_eq!(script.module_bindings().find_index_by_name("$b"), b);
        assert_eq!(
            script.get_module(&Var::name("$a")).and_then(|m| m.name()),
            Some("$a")
        );
        assert_eq!(
            script.first_module().and_then(|m| m.name()),
            Some("$a")
        );
        // An index that is not a module command resolves to nothing.
        assert!(script.get_module(&Var::index(1)).is_none());
        assert!(script.get_module(&Var::name("$c")).is_none());
        assert_eq!(script.last_module_index(), Some(2));
    }

    #[test]
    fn test_explicit_module_var_is_kept() {
        let mut script = Script::new();
        script.append_command(Command::Module(text_module(Some("$a"))));
        script.append_command(Command::Module(text_module(None)));
        script.append_command(Command::Action(
            Action::invoke("f", vec![]).with_module(Var::name("$a")),
        ));

        let action = script.commands()[2].action().map(|a| a.module_var.clone());
        assert_eq!(action, Some(Var::name("$a")));
    }

    #[test]
    fn test_action_before_any_module_keeps_default() {
        let mut script = Script::new();
        script.append_command(Command::Action(Action::get("g")));
        let var = script.commands()[0].action().map(|a| a.module_var.clone());
        assert_eq!(var, Some(Var::default()));
        assert!(script.first_module().is_none());
    }

    #[test]
    fn test_quoted_text_wrapping() -> anyhow::Result<()> {
        assert_eq!(quoted_text(b"(func)")?, "(module (func))");
        assert_eq!(quoted_text(b"  (module $m)")?, "  (module $m)");
        assert!(quoted_text(&[0xff, 0xfe]).is_err());
        Ok(())
    }
}
