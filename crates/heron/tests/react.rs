//! End-to-end scenarios for the ReAct loop against a scripted model.

use futures::StreamExt;
use serde_json::{json, Map, Value};

use heron::agent::{Agent, HookContext, ReActAgent};
use heron::format::{Formatter, MultiAgentFormatter};
use heron::message::{ContentBlock, Msg, Role, ToolUseBlock};
use heron::model::{ChatResponse, MockChatModel, FRAGMENT_NAME};
use heron::tool::{ToolExecutor, ToolResponse, Toolkit};

fn text_chunk(id: &str, text: &str) -> ChatResponse {
    ChatResponse::new(id, vec![ContentBlock::text(text)])
}

fn fragment_chunk(id: &str, call_id: &str, name: &str, raw: &str) -> ChatResponse {
    ChatResponse::new(
        id,
        vec![ContentBlock::ToolUse(ToolUseBlock {
            id: call_id.to_string(),
            name: name.to_string(),
            input: Map::new(),
            raw: Some(raw.to_string()),
        })],
    )
}

fn echo_toolkit() -> Toolkit {
    let toolkit = Toolkit::new();
    toolkit.register_fn(
        "echo",
        "Echoes back the input",
        json!({
            "type": "object",
            "properties": {"text": {"type": "string"}},
            "required": ["text"]
        }),
        |input: Map<String, Value>| async move {
            let text = input
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Ok(ToolResponse::text(text))
        },
    );
    toolkit
}

// S1: a plain text exchange, no tool call.
#[tokio::test]
async fn one_shot_text() {
    let agent = ReActAgent::builder()
        .name("bot")
        .model(MockChatModel::new(vec![vec![text_chunk("r1", "Hi!")]]))
        .build()
        .unwrap();

    let reply = agent
        .reply(Msg::user("alice", ContentBlock::text("Hello")).into())
        .await
        .unwrap();
    assert_eq!(reply.role, Role::Assistant);
    assert_eq!(reply.text_content(), "Hi!");

    let memory = agent.memory().messages();
    assert_eq!(memory.len(), 2);
    assert_eq!(memory[0].role, Role::User);
    assert_eq!(memory[0].text_content(), "Hello");
    assert_eq!(memory[1].role, Role::Assistant);
    assert_eq!(memory[1].text_content(), "Hi!");
}

// S2: a fragmented tool call, its execution, and the final answer.
#[tokio::test]
async fn single_tool_call() {
    let agent = ReActAgent::builder()
        .name("bot")
        .model(MockChatModel::new(vec![
            vec![
                fragment_chunk("r1", "call_1", "get_time", "{\"zone\":"),
                fragment_chunk("r1", "", FRAGMENT_NAME, "\"UTC\"}"),
            ],
            vec![text_chunk("r2", "It is 12:00:00 UTC.")],
        ]))
        .build()
        .unwrap();
    agent.toolkit().register_fn(
        "get_time",
        "Reads the clock in a zone",
        json!({
            "type": "object",
            "properties": {"zone": {"type": "string"}},
            "required": ["zone"]
        }),
        |input: Map<String, Value>| async move {
            assert_eq!(input.get("zone"), Some(&json!("UTC")));
            Ok(ToolResponse::text("12:00:00"))
        },
    );

    let streamed: Vec<Msg> = agent
        .stream(Msg::user("alice", ContentBlock::text("What time is it?")).into())
        .map(|item| item.unwrap())
        .collect()
        .await;

    // The assembled call appears on the stream before the tool result.
    let call = streamed
        .iter()
        .find_map(|m| m.content.as_tool_use())
        .expect("stream carries the assembled tool call");
    assert_eq!(call.id, "call_1");
    assert_eq!(call.name, "get_time");
    assert_eq!(call.input.get("zone"), Some(&json!("UTC")));
    assert!(streamed
        .iter()
        .any(|m| m.text_content() == "It is 12:00:00 UTC."));

    let memory = agent.memory().messages();
    assert_eq!(memory.len(), 4);
    assert_eq!(memory[1].role, Role::Assistant);
    assert!(memory[1].content.as_tool_use().is_some());
    let result = memory[2].content.as_tool_result().unwrap();
    assert_eq!(memory[2].role, Role::Tool);
    assert_eq!(result.id, "call_1");
    assert_eq!(result.output.render_text(), "12:00:00");
    assert_eq!(memory[3].text_content(), "It is 12:00:00 UTC.");
}

// S3: a parallel batch keeps input order regardless of completion order.
#[tokio::test]
async fn parallel_tool_batch_preserves_order() {
    let toolkit = Toolkit::new();
    toolkit.register_fn(
        "echo",
        "Echoes after a delay",
        json!({
            "type": "object",
            "properties": {
                "text": {"type": "string"},
                "delay_ms": {"type": "integer"}
            },
            "required": ["text"]
        }),
        |input: Map<String, Value>| async move {
            let delay = input.get("delay_ms").and_then(Value::as_u64).unwrap_or(0);
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            Ok(ToolResponse::text(
                input.get("text").and_then(Value::as_str).unwrap_or_default(),
            ))
        },
    );
    let executor = ToolExecutor::new(toolkit);

    let mut input_a = Map::new();
    input_a.insert("text".to_string(), json!("A"));
    input_a.insert("delay_ms".to_string(), json!(60));
    let mut input_b = Map::new();
    input_b.insert("text".to_string(), json!("B"));
    let calls = vec![
        ToolUseBlock {
            id: "a".to_string(),
            name: "echo".to_string(),
            input: input_a,
            raw: None,
        },
        ToolUseBlock {
            id: "b".to_string(),
            name: "echo".to_string(),
            input: input_b,
            raw: None,
        },
    ];

    let responses = executor.dispatch(&calls, true).await;
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0].id, "a");
    assert_eq!(responses[0].text_content(), "A");
    assert_eq!(responses[1].id, "b");
    assert_eq!(responses[1].text_content(), "B");
}

// S4: a call to an unregistered tool terminates the loop without acting.
#[tokio::test]
async fn unregistered_tool_terminates() {
    let agent = ReActAgent::builder()
        .name("bot")
        .model(MockChatModel::new(vec![vec![fragment_chunk(
            "r1",
            "call_f",
            "generate_response",
            "{\"response\":\"bye\"}",
        )]]))
        .toolkit(echo_toolkit())
        .build()
        .unwrap();

    let reply = agent
        .reply(Msg::user("alice", ContentBlock::text("Wrap it up")).into())
        .await
        .unwrap();
    assert_eq!(reply.text_content(), "");

    let memory = agent.memory().messages();
    assert_eq!(memory.len(), 2);
    assert!(memory.iter().all(|m| m.role != Role::Tool));
}

// S5: the iteration cap bounds a model that never stops calling tools.
#[tokio::test]
async fn iteration_cap() {
    let rounds: Vec<Vec<ChatResponse>> = (0..5)
        .map(|_| vec![fragment_chunk("r", "", "loop", "{}")])
        .collect();
    let toolkit = Toolkit::new();
    toolkit.register_fn(
        "loop",
        "Always succeeds",
        json!({"type": "object", "properties": {}}),
        |_| async move { Ok(ToolResponse::text("ok")) },
    );
    let agent = ReActAgent::builder()
        .name("bot")
        .model(MockChatModel::new(rounds))
        .toolkit(toolkit)
        .max_iters(3)
        .build()
        .unwrap();

    let reply = agent
        .reply(Msg::user("alice", ContentBlock::text("go")).into())
        .await
        .unwrap();
    assert_eq!(reply.role, Role::Assistant);

    let memory = agent.memory().messages();
    let tool_results: Vec<_> = memory.iter().filter(|m| m.role == Role::Tool).collect();
    assert_eq!(tool_results.len(), 3);
    for result in tool_results {
        assert_eq!(result.content.as_tool_result().unwrap().output.render_text(), "ok");
    }
}

// S6: the multi-agent formatter collapses the conversation into history.
#[test]
fn multi_agent_collapse() {
    let formatter = MultiAgentFormatter::new();
    let memory = vec![
        Msg::user("Alice", ContentBlock::text("Hi")),
        Msg::assistant("Bot", ContentBlock::text("Hello")),
        Msg::user("Alice", ContentBlock::text("Bye")),
    ];
    let wire = formatter.format(&memory);

    assert_eq!(wire.len(), 1);
    assert_eq!(wire[0]["role"], json!("user"));
    assert_eq!(
        wire[0]["content"],
        json!("<history>\nUser Alice: Hi\nAssistant Bot: Hello\nUser Alice: Bye\n</history>")
    );
}

// Pre-hooks shape what the loop sees; post-hooks shape what the caller sees.
#[tokio::test]
async fn hooks_wrap_reply() {
    let agent = ReActAgent::builder()
        .name("bot")
        .model(MockChatModel::new(vec![vec![text_chunk("r1", "pong")]]))
        .build()
        .unwrap();
    agent.hooks().register_pre_reply(
        "stamp-input",
        |_: &HookContext, mut args: Vec<Msg>| {
            args.push(Msg::user("system-of-record", ContentBlock::text("context")));
            Ok(args)
        },
    );
    agent.hooks().register_post_reply(
        "decorate",
        |ctx: &HookContext, _: &[Msg], output: &Msg| {
            Ok(Some(Msg::assistant(
                ctx.agent_name.clone(),
                ContentBlock::text(format!("{}!", output.text_content())),
            )))
        },
    );

    let reply = agent
        .reply(Msg::user("alice", ContentBlock::text("ping")).into())
        .await
        .unwrap();
    assert_eq!(reply.text_content(), "pong!");

    // The pre-hook's extra message reached memory ahead of the loop.
    let memory = agent.memory().messages();
    assert_eq!(memory[1].name, "system-of-record");
}

// Memory length only moves forward during an agent's life.
#[tokio::test]
async fn memory_is_monotonic() {
    let agent = ReActAgent::builder()
        .name("bot")
        .model(MockChatModel::new(vec![
            vec![text_chunk("r1", "one")],
            vec![text_chunk("r2", "two")],
        ]))
        .build()
        .unwrap();

    let mut lengths = vec![agent.memory().len()];
    agent
        .reply(Msg::user("alice", ContentBlock::text("1")).into())
        .await
        .unwrap();
    lengths.push(agent.memory().len());
    agent
        .reply(Msg::user("alice", ContentBlock::text("2")).into())
        .await
        .unwrap();
    lengths.push(agent.memory().len());

    assert!(lengths.windows(2).all(|w| w[0] <= w[1]), "{lengths:?}");
}
