use hashbrown::HashMap;

use super::handlers_counter::{handle_decr, handle_decrby, handle_incr, handle_incrby};
use super::handlers_expiry::{handle_expire, handle_persist, handle_pexpire, handle_pttl, handle_ttl};
use super::handlers_keyspace::{handle_del, handle_exists, handle_keys, handle_rename, handle_type};
use super::handlers_server::{
    handle_bgrewriteaof, handle_config, handle_dbsize, handle_echo, handle_flushdb, handle_info,
    handle_noop_ok, handle_ping,
};
use super::handlers_string::{
    handle_append, handle_get, handle_mget, handle_mset, handle_set, handle_setex, handle_setnx,
    handle_strlen,
};
use super::{CommandArity, CommandFrame, CommandSpec, ServerContext};
use crate::reply::CommandReply;

/// Runtime command registry.
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    entries: HashMap<String, CommandSpec>,
}

impl CommandRegistry {
    /// Builds an empty command registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Builds a registry preloaded with the full command catalogue.
    #[must_use]
    pub fn with_builtin_commands() -> Self {
        let mut registry = Self::new();
        registry.register_string_commands();
        registry.register_counter_commands();
        registry.register_key_commands();
        registry.register_server_commands();
        registry
    }

    fn register_string_commands(&mut self) {
        self.register(CommandSpec {
            name: "SET",
            arity: CommandArity::AtLeast(2),
            handler: handle_set,
        });
        self.register(CommandSpec {
            name: "GET",
            arity: CommandArity::Exact(1),
            handler: handle_get,
        });
        self.register(CommandSpec {
            name: "SETNX",
            arity: CommandArity::Exact(2),
            handler: handle_setnx,
        });
        self.register(CommandSpec {
            name: "SETEX",
            arity: CommandArity::Exact(3),
            handler: handle_setex,
        });
        self.register(CommandSpec {
            name: "MGET",
            arity: CommandArity::AtLeast(1),
            handler: handle_mget,
        });
        self.register(CommandSpec {
            name: "MSET",
            arity: CommandArity::AtLeast(2),
            handler: handle_mset,
        });
        self.register(CommandSpec {
            name: "APPEND",
            arity: CommandArity::Exact(2),
            handler: handle_append,
        });
        self.register(CommandSpec {
            name: "STRLEN",
            arity: CommandArity::Exact(1),
            handler: handle_strlen,
        });
    }

    fn register_counter_commands(&mut self) {
        self.register(CommandSpec {
            name: "INCR",
            arity: CommandArity::Exact(1),
            handler: handle_incr,
        });
        self.register(CommandSpec {
            name: "DECR",
            arity: CommandArity::Exact(1),
            handler: handle_decr,
        });
        self.register(CommandSpec {
            name: "INCRBY",
            arity: CommandArity::Exact(2),
            handler: handle_incrby,
        });
        self.register(CommandSpec {
            name: "DECRBY",
            arity: CommandArity::Exact(2),
            handler: handle_decrby,
        });
    }

    fn register_key_commands(&mut self) {
        self.register(CommandSpec {
            name: "EXISTS",
            arity: CommandArity::AtLeast(1),
            handler: handle_exists,
        });
        self.register(CommandSpec {
            name: "DEL",
            arity: CommandArity::AtLeast(1),
            handler: handle_del,
        });
        self.register(CommandSpec {
            name: "EXPIRE",
            arity: CommandArity::Exact(2),
            handler: handle_expire,
        });
        self.register(CommandSpec {
            name: "PEXPIRE",
            arity: CommandArity::Exact(2),
            handler: handle_pexpire,
        });
        self.register(CommandSpec {
            name: "TTL",
            arity: CommandArity::Exact(1),
            handler: handle_ttl,
        });
        self.register(CommandSpec {
            name: "PTTL",
            arity: CommandArity::Exact(1),
            handler: handle_pttl,
        });
        self.register(CommandSpec {
            name: "PERSIST",
            arity: CommandArity::Exact(1),
            handler: handle_persist,
        });
        self.register(CommandSpec {
            name: "TYPE",
            arity: CommandArity::Exact(1),
            handler: handle_type,
        });
        self.register(CommandSpec {
            name: "RENAME",
            arity: CommandArity::Exact(2),
            handler: handle_rename,
        });
        self.register(CommandSpec {
            name: "KEYS",
            arity: CommandArity::Exact(1),
            handler: handle_keys,
        });
    }

    fn register_server_commands(&mut self) {
        self.register(CommandSpec {
            name: "PING",
            arity: CommandArity::AtLeast(0),
            handler: handle_ping,
        });
        self.register(CommandSpec {
            name: "ECHO",
            arity: CommandArity::Exact(1),
            handler: handle_echo,
        });
        self.register(CommandSpec {
            name: "DBSIZE",
            arity: CommandArity::Exact(0),
            handler: handle_dbsize,
        });
        self.register(CommandSpec {
            name: "FLUSHDB",
            arity: CommandArity::AtLeast(0),
            handler: handle_flushdb,
        });
        self.register(CommandSpec {
            name: "FLUSHALL",
            arity: CommandArity::AtLeast(0),
            handler: handle_flushdb,
        });
        self.register(CommandSpec {
            name: "INFO",
            arity: CommandArity::AtLeast(0),
            handler: handle_info,
        });
        self.register(CommandSpec {
            name: "SELECT",
            arity: CommandArity::Exact(1),
            handler: handle_noop_ok,
        });
        self.register(CommandSpec {
            name: "COMMAND",
            arity: CommandArity::AtLeast(0),
            handler: handle_noop_ok,
        });
        self.register(CommandSpec {
            name: "CONFIG",
            arity: CommandArity::AtLeast(0),
            handler: handle_config,
        });
        self.register(CommandSpec {
            name: "CLIENT",
            arity: CommandArity::AtLeast(0),
            handler: handle_noop_ok,
        });
        self.register(CommandSpec {
            name: "BGREWRITEAOF",
            arity: CommandArity::Exact(0),
            handler: handle_bgrewriteaof,
        });
    }

    /// Registers or replaces one command in the table.
    pub fn register(&mut self, spec: CommandSpec) {
        self.entries.insert(spec.name.to_owned(), spec);
    }

    /// Validates command existence and arity without executing handler logic.
    ///
    /// # Errors
    ///
    /// Returns user-facing error text for unknown command names or invalid argument count.
    pub fn validate_frame(&self, frame: &CommandFrame) -> Result<(), String> {
        let command_name = frame.name.to_ascii_uppercase();
        let Some(spec) = self.entries.get(&command_name) else {
            return Err(format!("unknown command '{command_name}'"));
        };

        match spec.arity {
            CommandArity::Exact(expected) if frame.args.len() != expected => Err(format!(
                "wrong number of arguments for '{}' command",
                spec.name
            )),
            CommandArity::AtLeast(minimum) if frame.args.len() < minimum => Err(format!(
                "wrong number of arguments for '{}' command",
                spec.name
            )),
            _ => Ok(()),
        }
    }

    /// Dispatches one canonical command frame to its registered handler.
    #[must_use]
    pub fn dispatch(&self, ctx: &ServerContext, frame: &CommandFrame) -> CommandReply {
        if let Err(message) = self.validate_frame(frame) {
            return CommandReply::Error(message);
        }

        let command_name = frame.name.to_ascii_uppercase();
        let Some(spec) = self.entries.get(&command_name) else {
            return CommandReply::Error(format!("unknown command '{command_name}'"));
        };
        (spec.handler)(ctx, frame)
    }
}
