//! Built-in slash commands (spec §6 "In-chat slash commands").

use orc_core::command::{CommandCategory, CommandDefinition, CommandRegistry, CommandResult};
use std::sync::Arc;

const HELP_TEXT: &str = "\
Built-in commands:
  /help              show this message
  /theme             report the current color theme (always \"auto\" — no TUI in this surface)
  /clear             clear the conversation history
  /compact           summarize history to free up context (no-op placeholder)
  /model [name]      show or change the active backend
  /exit              leave the chat session
  /ralph \"<prompt>\"  run the Ralph autonomous-implementation workflow (alias: /loop)";

pub fn register_builtins(registry: &mut CommandRegistry) {
    registry.register(CommandDefinition {
        name: "help".to_string(),
        aliases: vec![],
        category: CommandCategory::Builtin,
        argument_hint: None,
        hidden: false,
        handler: Arc::new(|_args, _ctx| CommandResult::ok(HELP_TEXT)),
    });

    registry.register(CommandDefinition {
        name: "theme".to_string(),
        aliases: vec![],
        category: CommandCategory::Builtin,
        argument_hint: None,
        hidden: false,
        handler: Arc::new(|_args, _ctx| CommandResult::ok("theme: auto")),
    });

    registry.register(CommandDefinition {
        name: "clear".to_string(),
        aliases: vec![],
        category: CommandCategory::Builtin,
        argument_hint: None,
        hidden: false,
        handler: Arc::new(|_args, ctx| {
            ctx.session.message_history.clear();
            CommandResult {
                success: true,
                message: Some("Conversation cleared.".to_string()),
                clear_messages: true,
                ..Default::default()
            }
        }),
    });

    registry.register(CommandDefinition {
        name: "compact".to_string(),
        aliases: vec![],
        category: CommandCategory::Builtin,
        argument_hint: None,
        hidden: false,
        handler: Arc::new(|_args, ctx| {
            let kept = ctx.session.message_history.len().min(2);
            let tail: Vec<_> = ctx
                .session
                .message_history
                .split_off(ctx.session.message_history.len().saturating_sub(kept));
            ctx.session.message_history = tail;
            CommandResult::ok("History compacted.")
        }),
    });

    registry.register(CommandDefinition {
        name: "model".to_string(),
        aliases: vec![],
        category: CommandCategory::Builtin,
        argument_hint: Some("[name]".to_string()),
        hidden: false,
        handler: Arc::new(|args, ctx| {
            if let Some(name) = args.first() {
                ctx.session.model = Some(name.clone());
                CommandResult::ok(format!("Model set to {name}."))
            } else {
                let current = ctx.session.model.clone().unwrap_or_else(|| "default".to_string());
                CommandResult::ok(format!("Current model: {current}"))
            }
        }),
    });

    registry.register(CommandDefinition {
        name: "exit".to_string(),
        aliases: vec!["quit".to_string()],
        category: CommandCategory::Builtin,
        argument_hint: None,
        hidden: false,
        handler: Arc::new(|_args, _ctx| CommandResult {
            success: true,
            message: Some("Goodbye.".to_string()),
            destroy_session: true,
            ..Default::default()
        }),
    });

    registry.register(CommandDefinition {
        name: "ralph".to_string(),
        aliases: vec!["loop".to_string()],
        category: CommandCategory::Workflow,
        argument_hint: Some("\"<prompt>\"".to_string()),
        hidden: false,
        handler: Arc::new(|args, _ctx| {
            let prompt = args.join(" ");
            if prompt.trim().is_empty() {
                return CommandResult::fail("usage: /ralph \"<prompt>\"");
            }
            CommandResult::ok(format!("Starting Ralph workflow: {prompt}"))
                .with_state_update(serde_json::json!({ "start_workflow": "ralph", "prompt": prompt }))
        }),
    });
}
