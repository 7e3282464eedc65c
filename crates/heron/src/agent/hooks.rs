use std::sync::{Arc, Mutex};

use anyhow::Result;
use tracing::warn;

use crate::message::Msg;

/// Identity of the agent a hook is running for.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub agent_id: String,
    pub agent_name: String,
}

/// Transforms the reply input before the loop runs. Returning the (possibly
/// modified) messages feeds them to later hooks and the core; an `Err` is
/// logged and the current messages continue unchanged.
pub trait PreReplyHook: Send + Sync {
    fn call(&self, ctx: &HookContext, args: Vec<Msg>) -> Result<Vec<Msg>>;
}

impl<F> PreReplyHook for F
where
    F: Fn(&HookContext, Vec<Msg>) -> Result<Vec<Msg>> + Send + Sync,
{
    fn call(&self, ctx: &HookContext, args: Vec<Msg>) -> Result<Vec<Msg>> {
        self(ctx, args)
    }
}

/// Transforms each message emitted by a reply. `Ok(Some(msg))` replaces the
/// output for later hooks and the caller, `Ok(None)` passes it through, and
/// an `Err` is logged and the current output continues unchanged.
pub trait PostReplyHook: Send + Sync {
    fn call(&self, ctx: &HookContext, args: &[Msg], output: &Msg) -> Result<Option<Msg>>;
}

impl<F> PostReplyHook for F
where
    F: Fn(&HookContext, &[Msg], &Msg) -> Result<Option<Msg>> + Send + Sync,
{
    fn call(&self, ctx: &HookContext, args: &[Msg], output: &Msg) -> Result<Option<Msg>> {
        self(ctx, args, output)
    }
}

#[derive(Default)]
struct HookRegistry {
    pre_reply: Vec<(String, Arc<dyn PreReplyHook>)>,
    post_reply: Vec<(String, Arc<dyn PostReplyHook>)>,
}

/// Per-agent-instance registry of ordered reply hooks.
///
/// Hooks run in registration order; re-registering a name replaces the hook
/// in place. Dispatch works on a snapshot taken at the start of each reply,
/// so concurrent registry mutation never affects an in-flight call.
#[derive(Clone, Default)]
pub struct HookManager {
    inner: Arc<Mutex<HookRegistry>>,
}

impl HookManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_pre_reply<S, H>(&self, name: S, hook: H)
    where
        S: Into<String>,
        H: PreReplyHook + 'static,
    {
        let name = name.into();
        let hook: Arc<dyn PreReplyHook> = Arc::new(hook);
        let mut registry = self.lock();
        match registry.pre_reply.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = hook,
            None => registry.pre_reply.push((name, hook)),
        }
    }

    pub fn register_post_reply<S, H>(&self, name: S, hook: H)
    where
        S: Into<String>,
        H: PostReplyHook + 'static,
    {
        let name = name.into();
        let hook: Arc<dyn PostReplyHook> = Arc::new(hook);
        let mut registry = self.lock();
        match registry.post_reply.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = hook,
            None => registry.post_reply.push((name, hook)),
        }
    }

    /// Remove a hook by name from both registries.
    pub fn remove(&self, name: &str) -> bool {
        let mut registry = self.lock();
        let before = registry.pre_reply.len() + registry.post_reply.len();
        registry.pre_reply.retain(|(n, _)| n != name);
        registry.post_reply.retain(|(n, _)| n != name);
        registry.pre_reply.len() + registry.post_reply.len() != before
    }

    pub fn clear(&self) {
        let mut registry = self.lock();
        registry.pre_reply.clear();
        registry.post_reply.clear();
    }

    pub(crate) fn pre_reply_snapshot(&self) -> Vec<(String, Arc<dyn PreReplyHook>)> {
        self.lock().pre_reply.clone()
    }

    pub(crate) fn post_reply_snapshot(&self) -> Vec<(String, Arc<dyn PostReplyHook>)> {
        self.lock().post_reply.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HookRegistry> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Run the pre-reply chain; each hook sees the previous hook's result and
/// failures are isolated.
pub(crate) fn apply_pre_reply(
    hooks: &[(String, Arc<dyn PreReplyHook>)],
    ctx: &HookContext,
    args: Vec<Msg>,
) -> Vec<Msg> {
    let mut current = args;
    for (name, hook) in hooks {
        match hook.call(ctx, current.clone()) {
            Ok(next) => current = next,
            Err(err) => {
                warn!(hook = %name, "pre-reply hook failed: {err}");
            }
        }
    }
    current
}

/// Run the post-reply chain over one emitted message.
pub(crate) fn apply_post_reply(
    hooks: &[(String, Arc<dyn PostReplyHook>)],
    ctx: &HookContext,
    args: &[Msg],
    output: Msg,
) -> Msg {
    let mut current = output;
    for (name, hook) in hooks {
        match hook.call(ctx, args, &current) {
            Ok(Some(replaced)) => current = replaced,
            Ok(None) => {}
            Err(err) => {
                warn!(hook = %name, "post-reply hook failed: {err}");
            }
        }
    }
    current
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;
    use crate::message::ContentBlock;

    fn ctx() -> HookContext {
        HookContext {
            agent_id: "agent_1".to_string(),
            agent_name: "bot".to_string(),
        }
    }

    fn text_msg(text: &str) -> Msg {
        Msg::user("alice", ContentBlock::text(text))
    }

    #[test]
    fn test_pre_hooks_chain_in_registration_order() {
        let hooks = HookManager::new();
        hooks.register_pre_reply("first", |_: &HookContext, mut args: Vec<Msg>| {
            args.push(text_msg("from-first"));
            Ok(args)
        });
        hooks.register_pre_reply("second", |_: &HookContext, mut args: Vec<Msg>| {
            args.push(text_msg("from-second"));
            Ok(args)
        });

        let out = apply_pre_reply(&hooks.pre_reply_snapshot(), &ctx(), vec![text_msg("input")]);
        let texts: Vec<&str> = out.iter().map(|m| m.text_content()).collect();
        assert_eq!(texts, vec!["input", "from-first", "from-second"]);
    }

    #[test]
    fn test_failing_pre_hook_is_isolated() {
        let hooks = HookManager::new();
        hooks.register_pre_reply("boom", |_: &HookContext, _: Vec<Msg>| {
            Err(anyhow!("hook exploded"))
        });
        hooks.register_pre_reply("after", |_: &HookContext, mut args: Vec<Msg>| {
            args.push(text_msg("after"));
            Ok(args)
        });

        let out = apply_pre_reply(&hooks.pre_reply_snapshot(), &ctx(), vec![text_msg("input")]);
        // The failing hook changed nothing; the next hook saw the original args.
        let texts: Vec<&str> = out.iter().map(|m| m.text_content()).collect();
        assert_eq!(texts, vec!["input", "after"]);
    }

    #[test]
    fn test_post_hook_replaces_output() {
        let hooks = HookManager::new();
        hooks.register_post_reply("upper", |_: &HookContext, _: &[Msg], output: &Msg| {
            let text = output.text_content().to_uppercase();
            Ok(Some(Msg::assistant(output.name.clone(), ContentBlock::text(text))))
        });

        let out = apply_post_reply(
            &hooks.post_reply_snapshot(),
            &ctx(),
            &[],
            Msg::assistant("bot", ContentBlock::text("hi")),
        );
        assert_eq!(out.text_content(), "HI");
    }

    #[test]
    fn test_post_hook_pass_through_and_failure() {
        let hooks = HookManager::new();
        hooks.register_post_reply("noop", |_: &HookContext, _: &[Msg], _: &Msg| Ok(None));
        hooks.register_post_reply("boom", |_: &HookContext, _: &[Msg], _: &Msg| {
            Err(anyhow!("hook exploded"))
        });

        let out = apply_post_reply(
            &hooks.post_reply_snapshot(),
            &ctx(),
            &[],
            Msg::assistant("bot", ContentBlock::text("unchanged")),
        );
        assert_eq!(out.text_content(), "unchanged");
    }

    #[test]
    fn test_reregistering_replaces_in_place() {
        let hooks = HookManager::new();
        hooks.register_post_reply("tag", |_: &HookContext, _: &[Msg], output: &Msg| {
            Ok(Some(Msg::assistant(
                output.name.clone(),
                ContentBlock::text(format!("v1:{}", output.text_content())),
            )))
        });
        hooks.register_post_reply("tag", |_: &HookContext, _: &[Msg], output: &Msg| {
            Ok(Some(Msg::assistant(
                output.name.clone(),
                ContentBlock::text(format!("v2:{}", output.text_content())),
            )))
        });

        let snapshot = hooks.post_reply_snapshot();
        assert_eq!(snapshot.len(), 1);
        let out = apply_post_reply(
            &snapshot,
            &ctx(),
            &[],
            Msg::assistant("bot", ContentBlock::text("x")),
        );
        assert_eq!(out.text_content(), "v2:x");
    }

    #[test]
    fn test_remove_and_clear() {
        let hooks = HookManager::new();
        hooks.register_pre_reply("a", |_: &HookContext, args: Vec<Msg>| Ok(args));
        hooks.register_post_reply("a", |_: &HookContext, _: &[Msg], _: &Msg| Ok(None));
        assert!(hooks.remove("a"));
        assert!(!hooks.remove("a"));

        hooks.register_pre_reply("b", |_: &HookContext, args: Vec<Msg>| Ok(args));
        hooks.clear();
        assert!(hooks.pre_reply_snapshot().is_empty());
    }
}
