//! Chat command registration and dispatch.
//!
//! Plugins describe a command with a [`CommandSpec`] (name, description,
//! word arguments, required privilege) and hand the registry a handler. The
//! host feeds raw command lines to [`CommandRegistry::dispatch`], which does
//! the parsing and the privilege check before the handler ever runs.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{PlayerId, ServerContext};

/// Privilege a caller needs to run a command. Ordered: a caller holding
/// `ControlServer` may run every `Chat` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Privilege {
    Chat,
    ControlServer,
}

/// One positional word argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: &'static str,
    pub required: bool,
}

impl ArgSpec {
    pub fn required(name: &'static str) -> Self {
        Self {
            name,
            required: true,
        }
    }

    pub fn optional(name: &'static str) -> Self {
        Self {
            name,
            required: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub args: Vec<ArgSpec>,
    pub privilege: Privilege,
}

impl CommandSpec {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            description: "",
            args: Vec::new(),
            privilege: Privilege::Chat,
        }
    }

    pub fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub fn with_arg(mut self, arg: ArgSpec) -> Self {
        self.args.push(arg);
        self
    }

    pub fn requires_privilege(mut self, privilege: Privilege) -> Self {
        self.privilege = privilege;
        self
    }
}

/// Who issued a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Player(PlayerId),
    /// The server console; holds every privilege but has no entity.
    Console,
}

impl Caller {
    pub fn player_id(&self) -> Option<&PlayerId> {
        match self {
            Caller::Player(id) => Some(id),
            Caller::Console => None,
        }
    }
}

/// Outcome reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    Success(Option<String>),
    Error(String),
}

impl CommandResult {
    pub fn ok() -> Self {
        CommandResult::Success(None)
    }

    pub fn ok_with(message: impl Into<String>) -> Self {
        CommandResult::Success(Some(message.into()))
    }

    pub fn error(message: impl Into<String>) -> Self {
        CommandResult::Error(message.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CommandResult::Success(_))
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            CommandResult::Success(message) => message.as_deref(),
            CommandResult::Error(message) => Some(message),
        }
    }
}

/// Everything a handler gets for one invocation.
pub struct CommandContext<'a> {
    pub host: &'a dyn ServerContext,
    pub caller: Caller,
    /// One slot per declared argument; `None` when an optional one was omitted.
    pub args: Vec<Option<String>>,
}

impl CommandContext<'_> {
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).and_then(|a| a.as_deref())
    }
}

pub type CommandHandler = Arc<dyn Fn(&CommandContext<'_>) -> CommandResult + Send + Sync>;

struct RegisteredCommand {
    spec: CommandSpec,
    handler: CommandHandler,
}

#[derive(Default)]
pub struct CommandRegistry {
    commands: RwLock<HashMap<String, RegisteredCommand>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `spec`. A second registration under the same name replaces
    /// the first.
    pub fn register<F>(&self, spec: CommandSpec, handler: F)
    where
        F: Fn(&CommandContext<'_>) -> CommandResult + Send + Sync + 'static,
    {
        let name = spec.name.to_string();
        let previous = self.commands.write().insert(
            name.clone(),
            RegisteredCommand {
                spec,
                handler: Arc::new(handler),
            },
        );

        if previous.is_some() {
            warn!("⚠️ Command /{} registered twice, keeping the latest", name);
        } else {
            info!("📝 Registered command /{}", name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.read().contains_key(name)
    }

    /// Registered command names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn description(&self, name: &str) -> Option<&'static str> {
        self.commands.read().get(name).map(|c| c.spec.description)
    }

    /// Parses `line` (with or without a leading `/`), checks privilege and
    /// arguments, then runs the handler.
    ///
    /// Words beyond the declared arguments are ignored.
    pub fn dispatch(
        &self,
        host: &dyn ServerContext,
        caller: Caller,
        caller_privilege: Privilege,
        line: &str,
    ) -> CommandResult {
        let line = line.trim();
        let line = line.strip_prefix('/').unwrap_or(line);
        let mut words = line.split_whitespace();

        let Some(name) = words.next() else {
            return CommandResult::error("Empty command");
        };

        // clone out of the lock so handlers may register further commands
        let (spec, handler) = {
            let commands = self.commands.read();
            match commands.get(name) {
                Some(command) => (command.spec.clone(), command.handler.clone()),
                None => return CommandResult::error(format!("Unknown command /{}", name)),
            }
        };

        if caller_privilege < spec.privilege {
            debug!("🔒 {:?} denied /{}", caller, name);
            return CommandResult::error("You don't have the privilege to use this command");
        }

        let mut args = Vec::with_capacity(spec.args.len());
        for arg in &spec.args {
            match words.next() {
                Some(word) => args.push(Some(word.to_string())),
                None if arg.required => {
                    return CommandResult::error(format!("Missing argument: {}", arg.name));
                }
                None => args.push(None),
            }
        }

        debug!("💬 {:?} ran /{} {:?}", caller, name, args);
        let context = CommandContext { host, caller, args };
        handler(&context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalServer;

    fn echo_registry() -> CommandRegistry {
        let registry = CommandRegistry::new();
        registry.register(
            CommandSpec::new("echo")
                .with_description("Echoes a word")
                .with_arg(ArgSpec::optional("word")),
            |ctx| CommandResult::ok_with(ctx.arg(0).unwrap_or("<none>")),
        );
        registry.register(
            CommandSpec::new("stop")
                .with_arg(ArgSpec::required("reason"))
                .requires_privilege(Privilege::ControlServer),
            |ctx| CommandResult::ok_with(format!("stopping: {}", ctx.arg(0).unwrap_or(""))),
        );
        registry
    }

    #[test]
    fn test_optional_argument_may_be_omitted() {
        let host = LocalServer::new("test");
        let registry = echo_registry();

        let result = registry.dispatch(&*host, Caller::Console, Privilege::Chat, "/echo");
        assert_eq!(result, CommandResult::ok_with("<none>"));

        let result = registry.dispatch(&*host, Caller::Console, Privilege::Chat, "echo hello there");
        assert_eq!(result, CommandResult::ok_with("hello"));
    }

    #[test]
    fn test_required_argument_and_privilege() {
        let host = LocalServer::new("test");
        let registry = echo_registry();

        let denied = registry.dispatch(&*host, Caller::Console, Privilege::Chat, "/stop now");
        assert!(!denied.is_success());

        let missing = registry.dispatch(&*host, Caller::Console, Privilege::ControlServer, "/stop");
        assert_eq!(missing, CommandResult::error("Missing argument: reason"));

        let ok = registry.dispatch(&*host, Caller::Console, Privilege::ControlServer, "/stop now");
        assert_eq!(ok, CommandResult::ok_with("stopping: now"));
    }

    #[test]
    fn test_unknown_and_empty_commands() {
        let host = LocalServer::new("test");
        let registry = echo_registry();

        assert_eq!(
            registry.dispatch(&*host, Caller::Console, Privilege::ControlServer, "/nope"),
            CommandResult::error("Unknown command /nope")
        );
        assert!(!registry
            .dispatch(&*host, Caller::Console, Privilege::ControlServer, "   ")
            .is_success());
        assert_eq!(registry.names(), vec!["echo".to_string(), "stop".to_string()]);
        assert_eq!(registry.description("echo"), Some("Echoes a word"));
    }
}
