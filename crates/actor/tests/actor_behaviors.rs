//! Actor Behavioral Tests - BDD Style
//!
//! Following BDD naming convention: given_<context>_when_<action>_then_<outcome>
//!
//! These tests exercise the action selection contract through small actors in
//! the style of a standard library: a line joiner that flushes on end of
//! stream, a two-way merge that alternates inputs, and a selector that routes
//! data by a boolean control input.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![allow(clippy::arithmetic_side_effects)]

use serde_json::Value;
use tokenflow_actor::{
    Action, ActionError, ActionFailure, Actor, ActorId, ActorManager, ActorState, ActorType,
    DynActor, FiringError, PortAddr, Production, Recovery, Token, TokenKind,
};

type TestResult = Result<(), Box<dyn std::error::Error>>;

// ============================================================================
// Test actors
// ============================================================================

/// Collects lines and emits them joined once the stream ends.
#[derive(Default)]
struct LineJoin {
    lines: Vec<String>,
    text: Option<String>,
}

impl ActorState for LineJoin {}

fn line_join(id: &str) -> Result<Actor<LineJoin>, tokenflow_actor::ActorError> {
    let kind = ActorType::builder("LineJoin")
        .input("line")
        .output("text")
        .action(
            Action::new("produce", |state: &mut LineJoin, _: Vec<Token>| {
                let text = state.text.take().unwrap_or_default();
                Ok(Production::one(Token::data(text)))
            })
            .outputs(["text"])
            .when(|state: &LineJoin, _| state.text.is_some()),
        )
        .action(
            Action::new("append", |state: &mut LineJoin, args: Vec<Token>| {
                for token in args {
                    let line = token
                        .as_str()
                        .ok_or_else(|| ActionError::unexpected_token("line", token.kind()))?;
                    state.lines.push(line.to_string());
                }
                Ok(Production::none())
            })
            .inputs(["line"]),
        )
        .on_exception(|state: &mut LineJoin, failure: ActionFailure<'_, LineJoin>| {
            if failure.is_end_of_stream() {
                state.text = Some(state.lines.join("\n"));
                state.lines.clear();
                Ok(Recovery::Fired(Production::none()))
            } else {
                Err(ActionError::failed("exception token in line stream"))
            }
        })
        .build()?;
    Ok(Actor::with_id(id, kind, LineJoin::default()))
}

/// Forwards tokens from two inputs, strictly alternating between them.
#[derive(Default)]
struct Alternate {
    second_next: bool,
}

impl ActorState for Alternate {}

fn forward(port: &'static str) -> Action<Alternate> {
    Action::new(port, |state: &mut Alternate, args: Vec<Token>| {
        state.second_next = !state.second_next;
        Ok(Production::new(args))
    })
    .inputs([port])
    .outputs(["token"])
}

fn alternate(id: &str) -> Result<Actor<Alternate>, tokenflow_actor::ActorError> {
    let kind = ActorType::builder("Alternate")
        .input("token_1")
        .input("token_2")
        .output("token")
        .action(forward("token_1").when(|state: &Alternate, _| !state.second_next))
        .action(forward("token_2").when(|state: &Alternate, _| state.second_next))
        .build()?;
    Ok(Actor::with_id(id, kind, Alternate::default()))
}

/// Routes a data token to the output chosen by a boolean select token.
#[derive(Default)]
struct Deselect;

impl ActorState for Deselect {}

fn select_branch(name: &'static str, data_port: &'static str, wanted: bool) -> Action<Deselect> {
    Action::new(name, |_: &mut Deselect, args: Vec<Token>| {
        args.into_iter()
            .next()
            .map(Production::one)
            .ok_or_else(|| ActionError::failed("missing data token"))
    })
    .inputs([data_port, "select"])
    .outputs(["data"])
    .when(move |_: &Deselect, tokens| {
        tokens
            .get(1)
            .and_then(|token| token.as_data())
            .and_then(Value::as_bool)
            == Some(wanted)
    })
}

fn deselect(id: &str) -> Result<Actor<Deselect>, tokenflow_actor::ActorError> {
    let kind = ActorType::builder("Deselect")
        .input("case_true")
        .input("case_false")
        .input("select")
        .output("data")
        .action(select_branch("select_true", "case_true", true))
        .action(select_branch("select_false", "case_false", false))
        .build()?;
    Ok(Actor::with_id(id, kind, Deselect))
}

/// Fire an actor until it stops making progress.
fn fire_until_idle(manager: &mut ActorManager, id: &ActorId) -> Result<usize, FiringError> {
    let mut firings = 0;
    while manager.fire_actor(id)?.did_fire() {
        firings += 1;
    }
    Ok(firings)
}

// ============================================================================
// 1. ACTION SELECTION
// ============================================================================

#[test]
fn given_guarded_high_priority_action_when_tokens_arrive_then_guard_selects_per_token()
-> TestResult {
    // GIVEN: consume_b (guard: value == "special") ranked above consume_a
    #[derive(Default)]
    struct Choices {
        picked: Vec<&'static str>,
    }
    impl ActorState for Choices {}

    let pick = |name: &'static str| {
        Action::new(name, move |state: &mut Choices, _: Vec<Token>| {
            state.picked.push(name);
            Ok(Production::none())
        })
        .inputs(["in"])
    };
    let kind = ActorType::builder("Chooser")
        .input("in")
        .action(pick("consume_b").when(|_: &Choices, tokens| {
            tokens.first().and_then(|token| token.as_str()) == Some("special")
        }))
        .action(pick("consume_a"))
        .build()?;
    let mut manager = ActorManager::new();
    let id = manager.add(Actor::with_id("chooser", kind, Choices::default()))?;

    // WHEN: Feeding x, special, y one per firing
    for value in ["x", "special", "y"] {
        manager.push_input(&PortAddr::new(id.clone(), "in"), Token::data(value))?;
        let result = manager.fire_actor(&id)?;
        assert!(result.did_fire(), "Each token should fire one action");
    }

    // THEN: Only the second firing selected consume_b
    let actor = manager
        .get_as::<Actor<Choices>>(&id)
        .ok_or("actor should be registered")?;
    assert_eq!(actor.state().picked, vec!["consume_a", "consume_b", "consume_a"]);
    Ok(())
}

#[test]
fn given_alternate_with_both_inputs_queued_when_fired_then_outputs_interleave() -> TestResult {
    // GIVEN: Two tokens on each input
    let mut actor = alternate("alt")?;
    for value in [1, 3] {
        actor.push_input("token_1", Token::data(value))?;
    }
    for value in [2, 4] {
        actor.push_input("token_2", Token::data(value))?;
    }

    // WHEN: Firing until nothing is eligible
    let mut firings = 0;
    while actor.fire()?.did_fire() {
        firings += 1;
    }

    // THEN: Outputs alternate between the inputs, one action per firing
    assert_eq!(firings, 4);
    assert_eq!(
        actor.drain_output("token")?,
        vec![Token::data(1), Token::data(2), Token::data(3), Token::data(4)]
    );
    Ok(())
}

#[test]
fn given_alternate_waiting_on_second_input_when_only_first_has_tokens_then_nothing_fires()
-> TestResult {
    // GIVEN: The first input already forwarded once
    let mut actor = alternate("alt")?;
    actor.push_input("token_1", Token::data("a"))?;
    actor.push_input("token_1", Token::data("b"))?;
    assert!(actor.fire()?.did_fire(), "Precondition: first token forwarded");

    // WHEN: Firing again with only token_1 pending
    let result = actor.fire()?;

    // THEN: The guard holds the second token_1 back
    assert!(!result.did_fire());
    assert_eq!(actor.ports().pending("token_1"), 1);
    Ok(())
}

#[test]
fn given_deselect_when_select_token_arrives_then_matching_branch_consumes_both() -> TestResult {
    // GIVEN: Data waiting on both branches
    let mut actor = deselect("sel")?;
    actor.push_input("case_true", Token::data("yes"))?;
    actor.push_input("case_false", Token::data("no"))?;

    // WHEN: A false select token arrives
    actor.push_input("select", Token::data(false))?;
    let result = actor.fire()?;

    // THEN: Only the false branch consumed, true branch untouched
    assert_eq!(
        result.produced_on(&PortAddr::new("sel", "data")),
        &[Token::data("no")]
    );
    assert_eq!(actor.ports().pending("case_true"), 1);
    assert_eq!(actor.ports().pending("case_false"), 0);
    assert_eq!(actor.ports().pending("select"), 0);
    Ok(())
}

#[test]
fn given_deselect_without_select_token_when_fired_then_condition_blocks_both_branches()
-> TestResult {
    // GIVEN: Data but no select token
    let mut actor = deselect("sel")?;
    actor.push_input("case_true", Token::data(1))?;

    // WHEN: Firing
    let result = actor.fire()?;

    // THEN: Nothing consumed
    assert!(!result.did_fire());
    assert_eq!(actor.ports().pending("case_true"), 1);
    Ok(())
}

// ============================================================================
// 2. CONTROL TOKENS AND EXCEPTION HANDLING
// ============================================================================

#[test]
fn given_line_join_when_end_of_stream_arrives_then_accumulated_text_is_flushed() -> TestResult {
    // GIVEN: A line joiner with two pending lines and an end-of-stream marker
    let mut manager = ActorManager::new();
    let id = manager.add(line_join("join")?)?;
    let line = PortAddr::new(id.clone(), "line");
    for token in [Token::data("alpha"), Token::data("beta"), Token::EndOfStream] {
        manager.push_input(&line, token)?;
    }

    // WHEN: Firing until idle
    let firings = fire_until_idle(&mut manager, &id)?;

    // THEN: Two appends, the flush, and the produce all counted as firings
    assert_eq!(firings, 4);
    let text = manager.drain_output(&PortAddr::new(id.clone(), "text"))?;
    assert_eq!(text, vec![Token::data("alpha\nbeta")]);

    let actor = manager
        .get_as::<Actor<LineJoin>>(&id)
        .ok_or("actor should be registered")?;
    assert!(actor.state().lines.is_empty());
    assert!(actor.state().text.is_none());
    Ok(())
}

#[test]
fn given_line_join_when_exception_token_arrives_then_handler_error_escapes_fire() -> TestResult {
    // GIVEN: A line joiner receiving an exception token
    let mut actor = line_join("join")?;
    actor.push_input("line", Token::exception("decode failed"))?;

    // WHEN: Firing
    let result = actor.fire();

    // THEN: The handler re-raises and the token is consumed
    assert!(matches!(result, Err(FiringError::Action { .. })));
    assert_eq!(actor.ports().pending("line"), 0);
    Ok(())
}

#[test]
fn given_actor_without_handler_when_end_of_stream_arrives_then_control_token_error()
-> TestResult {
    // GIVEN: A Deselect has no handler
    let mut actor = deselect("sel")?;
    actor.push_input("case_true", Token::EndOfStream)?;
    actor.push_input("select", Token::data(true))?;

    // WHEN: Firing
    let result = actor.fire();

    // THEN: The default handler re-raises as a control token failure
    match result {
        Err(FiringError::ControlToken { action, kind, .. }) => {
            assert_eq!(action, "select_true");
            assert_eq!(kind, TokenKind::EndOfStream);
        }
        other => return Err(format!("expected control token error, got {other:?}").into()),
    }
    Ok(())
}

#[test]
fn given_line_join_when_body_rejects_token_then_firing_error_names_action() -> TestResult {
    // GIVEN: A non-string data token, which the append body rejects
    let mut actor = line_join("join")?;
    actor.push_input("line", Token::data(42))?;

    // WHEN: Firing
    let result = actor.fire();

    // THEN: The handler sees a body failure and re-raises
    match result {
        Err(FiringError::Action { actor, action, .. }) => {
            assert_eq!(actor.as_str(), "join");
            assert_eq!(action, "append");
        }
        other => return Err(format!("expected action error, got {other:?}").into()),
    }
    Ok(())
}

// ============================================================================
// 3. WIRING
// ============================================================================

#[test]
fn given_alternate_wired_to_line_join_when_fired_then_downstream_receives_and_is_affected()
-> TestResult {
    // GIVEN: alt.token -> join.line
    let mut manager = ActorManager::new();
    let alt = manager.add(alternate("alt")?)?;
    let join = manager.add(line_join("join")?)?;
    manager.connect(
        PortAddr::new(alt.clone(), "token"),
        PortAddr::new(join.clone(), "line"),
    )?;
    manager.push_input(&PortAddr::new(alt.clone(), "token_1"), Token::data("one"))?;
    manager.push_input(&PortAddr::new(alt.clone(), "token_2"), Token::data("two"))?;

    // WHEN: Firing the upstream actor once
    let result = manager.fire_actor(&alt)?;

    // THEN: The token moved downstream and the joiner is marked affected
    assert!(result.affected().contains(&join));
    assert_eq!(
        manager
            .get(&join)
            .ok_or("join should be registered")?
            .ports()
            .pending("line"),
        1
    );

    // AND: Running both to quiescence joins the forwarded lines
    fire_until_idle(&mut manager, &alt)?;
    manager.push_input(&PortAddr::new(join.clone(), "line"), Token::EndOfStream)?;
    fire_until_idle(&mut manager, &join)?;
    let text = manager.drain_output(&PortAddr::new(join, "text"))?;
    assert_eq!(text, vec![Token::data("one\ntwo")]);
    Ok(())
}

#[test]
fn given_paused_actor_when_snapshot_taken_then_it_is_excluded_until_resumed() -> TestResult {
    // GIVEN: Three registered actors
    let mut manager = ActorManager::new();
    let a = manager.add(alternate("a")?)?;
    let b = manager.add(deselect("b")?)?;
    let c = manager.add(line_join("c")?)?;

    // WHEN: Pausing b and taking a snapshot
    manager.pause(&b)?;
    let snapshot = manager.enabled_actors();

    // THEN: Registration order without b
    assert_eq!(snapshot, vec![a.clone(), c.clone()]);

    // AND: Registering during a walk of the snapshot does not change it
    manager.add(line_join("d")?)?;
    assert_eq!(snapshot.len(), 2);

    manager.resume(&b)?;
    assert_eq!(manager.enabled_actors().len(), 4);
    Ok(())
}
