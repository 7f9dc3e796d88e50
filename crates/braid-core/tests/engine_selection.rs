use std::cell::{Cell, RefCell};
use std::rc::Rc;

use braid_core::{
    BProgram, Detail, Event, HandlerResult, Handlers, Idiom, Listener, Repeat, RuleFn, RuleIter,
    SnapshotMessage, b_sync, b_thread, b_thread_repeat,
};
use serde_json::json;

fn log_handler(
    log: &Rc<RefCell<Vec<String>>>,
    label: &str,
) -> impl Fn(Option<&Detail>) -> HandlerResult + 'static {
    let log = Rc::clone(log);
    let label = label.to_owned();
    move |_| {
        log.borrow_mut().push(label.clone());
        Ok(())
    }
}

fn requesting(event_type: &str) -> RuleFn {
    b_sync(Idiom::new().with_request(Event::new(event_type)))
}

#[test]
fn registration_order_is_selection_order() {
    let program = BProgram::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    program.set_threads(vec![("first", requesting("first")), ("second", requesting("second"))]);
    let _feedback = program.use_feedback(
        Handlers::new()
            .on("first", log_handler(&log, "first"))
            .on("second", log_handler(&log, "second")),
    );

    program.trigger(Event::new("go"));
    assert_eq!(*log.borrow(), ["first", "second"]);
}

#[test]
fn blocked_candidate_loses_regardless_of_priority() {
    let program = BProgram::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    program.set_threads(vec![
        ("wants-a", requesting("a")),
        ("wants-b", requesting("b")),
        // Lowest-priority thread, yet its block still vetoes "a".
        ("blocker", b_sync(Idiom::new().with_block("a").with_wait_for("never"))),
    ]);
    let _feedback = program.use_feedback(
        Handlers::new()
            .on("a", log_handler(&log, "a"))
            .on("b", log_handler(&log, "b")),
    );

    program.trigger(Event::new("go"));

    assert_eq!(*log.borrow(), ["b"]);
    assert!(program.thread_status("wants-a").pending, "blocked request stays pending");
}

#[test]
fn unblocking_selects_the_request_on_the_very_next_step() {
    let program = BProgram::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    let pings = Rc::new(Cell::new(0u32));
    let counter = Rc::clone(&pings);
    program.set_threads(vec![
        (
            "blocker",
            b_sync(Idiom::new().with_block("ping").with_wait_for("unblock")),
        ),
        (
            "pinger",
            b_thread_repeat(
                vec![b_sync(Idiom::new().with_request(Event::new("ping")))],
                Repeat::while_fn(move || {
                    let seen = counter.get();
                    counter.set(seen + 1);
                    seen < 2
                }),
            ),
        ),
    ]);
    let _feedback = program.use_feedback(
        Handlers::new()
            .on("ping", log_handler(&log, "ping"))
            .on("unblock", log_handler(&log, "unblock")),
    );

    assert!(log.borrow().is_empty());
    program.trigger(Event::new("unblock"));

    // The step right after the blocker retires selects "ping".
    assert_eq!(*log.borrow(), ["unblock", "ping", "ping"]);
}

#[test]
fn trigger_and_thread_request_of_same_type_fire_feedback_once() {
    let program = BProgram::new();
    let hits = Rc::new(Cell::new(0u32));

    program.set_threads(vec![("requester", requesting("A"))]);
    let counter = Rc::clone(&hits);
    let _feedback = program.use_feedback(Handlers::new().on("A", move |_| {
        counter.set(counter.get() + 1);
        Ok(())
    }));

    program.trigger(Event::new("A"));
    assert_eq!(hits.get(), 1, "exactly one feedback invocation for 'A'");
}

#[test]
fn nested_triggers_resolve_depth_first() {
    let program = BProgram::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    program.set_threads(vec![("wants-x", requesting("x")), ("wants-y", requesting("y"))]);

    let reentrant = program.clone();
    let x_log = Rc::clone(&log);
    let _feedback = program.use_feedback(
        Handlers::new()
            .on("x", move |_| {
                x_log.borrow_mut().push("x".to_owned());
                reentrant.trigger(Event::new("z"));
                Ok(())
            })
            .on("y", log_handler(&log, "y"))
            .on("z", log_handler(&log, "z")),
    );

    program.trigger(Event::new("go"));

    // The cascade born inside the "x" handler finishes before "y" fires.
    assert_eq!(*log.borrow(), ["x", "z", "y"]);
}

#[test]
fn templates_materialize_once_per_step_and_stay_fresh() {
    let program = BProgram::new();
    let calls = Rc::new(Cell::new(0u64));
    let selected_detail = Rc::new(RefCell::new(None));

    let still_blocking = Rc::new(Cell::new(true));
    let flag = Rc::clone(&still_blocking);
    let counter = Rc::clone(&calls);
    program.set_threads(vec![
        (
            "blocker",
            b_thread_repeat(
                vec![b_sync(Idiom::new().with_block("measure").with_wait_for("tick"))],
                Repeat::while_fn(move || flag.get()),
            ),
        ),
        (
            "reporter",
            b_sync(Idiom::new().with_request_template(move || {
                counter.set(counter.get() + 1);
                Event::new("measure").with_detail(json!(counter.get()))
            })),
        ),
    ]);

    let sink = Rc::clone(&selected_detail);
    let _feedback = program.use_feedback(Handlers::new().on("measure", move |detail| {
        *sink.borrow_mut() = detail.cloned();
        Ok(())
    }));

    // Two steps per trigger (the selection step and the final idle step),
    // one template evaluation in each.
    program.trigger(Event::new("tick"));
    assert_eq!(calls.get(), 2);
    program.trigger(Event::new("tick"));
    assert_eq!(calls.get(), 4);
    assert!(selected_detail.borrow().is_none(), "blocked template never selected");

    // Let the blocker retire; the next evaluation is selected with the
    // payload of that step, not a cached one.
    still_blocking.set(false);
    program.trigger(Event::new("tick"));
    assert_eq!(calls.get(), 6);
    assert_eq!(*selected_detail.borrow(), Some(json!(6)));
}

struct GuardedBody {
    cleaned_up: Rc<Cell<bool>>,
    position: u32,
}

impl Iterator for GuardedBody {
    type Item = Idiom;

    fn next(&mut self) -> Option<Idiom> {
        self.position += 1;
        match self.position {
            1 => Some(Idiom::new().with_wait_for("never").with_interrupt("stop")),
            2 => Some(Idiom::new().with_request(Event::new("after"))),
            _ => None,
        }
    }
}

impl Drop for GuardedBody {
    fn drop(&mut self) {
        self.cleaned_up.set(true);
    }
}

#[test]
fn interrupt_terminates_the_thread_in_the_same_step() {
    let program = BProgram::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    let cleaned_up = Rc::new(Cell::new(false));
    let snapshots = Rc::new(RefCell::new(Vec::new()));

    let probe = Rc::clone(&cleaned_up);
    let guarded: RuleFn = Rc::new(move || -> RuleIter {
        Box::new(GuardedBody {
            cleaned_up: Rc::clone(&probe),
            position: 0,
        })
    });
    program.set_threads(vec![("guarded", guarded)]);
    let _feedback = program.use_feedback(Handlers::new().on("after", log_handler(&log, "after")));
    let sink = Rc::clone(&snapshots);
    let _snapshot = program.use_snapshot(move |message| sink.borrow_mut().push(message.clone()));

    program.trigger(Event::new("start"));
    assert!(!cleaned_up.get(), "thread is parked, not terminated");

    program.trigger(Event::new("stop"));
    assert!(cleaned_up.get(), "interrupt runs cleanup in the same step");
    let status = program.thread_status("guarded");
    assert!(!status.running && !status.pending);
    assert!(log.borrow().is_empty(), "the idiom after the interrupt never runs");

    // The identity is gone from every later selection snapshot.
    snapshots.borrow_mut().clear();
    program.trigger(Event::new("later"));
    for message in snapshots.borrow().iter() {
        if let SnapshotMessage::Selection { bids } = message {
            assert!(bids.iter().all(|bid| bid.thread != "guarded"));
        }
    }
}

#[test]
fn wait_for_thread_cycles_back_to_running_when_its_event_fires() {
    let program = BProgram::new();
    let observed = Rc::new(RefCell::new(None));

    program.set_threads(vec![(
        "onlyThread",
        b_thread(vec![b_sync(Idiom::new().with_wait_for("x"))]),
    )]);

    let inspector = program.clone();
    let sink = Rc::clone(&observed);
    let _feedback = program.use_feedback(Handlers::new().on("x", move |_| {
        *sink.borrow_mut() = Some(inspector.thread_status("onlyThread"));
        Ok(())
    }));

    program.trigger(Event::new("x"));

    let status = observed.borrow().expect("feedback for 'x' fired");
    assert!(status.running, "satisfied waitFor moved the thread back to running");
    assert!(!status.pending);
}

#[test]
fn inert_idiom_parks_the_thread_silently() {
    let program = BProgram::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    program.set_threads(vec![("inert", b_sync(Idiom::new()))]);
    let _feedback = program.use_feedback(Handlers::new().on("go", log_handler(&log, "go")));

    program.trigger(Event::new("go"));

    let status = program.thread_status("inert");
    assert!(status.pending && !status.running);
    assert_eq!(*log.borrow(), ["go"], "the parked thread interferes with nothing");
}

#[test]
fn selection_snapshot_describes_candidates_and_blockers() {
    let program = BProgram::new();
    let snapshots = Rc::new(RefCell::new(Vec::new()));

    program.set_threads(vec![
        ("wants-a", requesting("a")),
        ("blocker", b_sync(Idiom::new().with_block("a").with_wait_for("never"))),
    ]);
    let sink = Rc::clone(&snapshots);
    let _snapshot = program.use_snapshot(move |message| sink.borrow_mut().push(message.clone()));

    program.trigger(Event::new("go").with_detail(json!({ "seq": 1 })));

    let snapshots = snapshots.borrow();
    assert_eq!(snapshots.len(), 1, "one committed selection, one snapshot");
    assert_eq!(
        snapshots[0].selected_bid().map(|bid| bid.event_type.as_str()),
        Some("go")
    );
    let SnapshotMessage::Selection { bids } = &snapshots[0] else {
        panic!("expected a selection snapshot");
    };

    assert_eq!(bids.len(), 2);
    let priorities: Vec<u32> = bids.iter().map(|bid| bid.priority).collect();
    let mut sorted = priorities.clone();
    sorted.sort_unstable();
    assert_eq!(priorities, sorted, "bids are ordered by priority");

    let trigger_bid = &bids[0];
    assert_eq!(trigger_bid.thread, "trigger(go)");
    assert!(trigger_bid.trigger && trigger_bid.selected);
    assert_eq!(trigger_bid.priority, 0);
    assert_eq!(trigger_bid.detail, Some(json!({ "seq": 1 })));

    let blocked_bid = bids.iter().find(|bid| bid.event_type == "a").unwrap();
    assert!(!blocked_bid.selected);
    assert_eq!(blocked_bid.blocked_by.as_deref(), Some("blocker"));
}

#[test]
fn predicate_listeners_match_on_detail() {
    let program = BProgram::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    program.set_threads(vec![(
        "big-only",
        b_thread(vec![
            b_sync(Idiom::new().with_wait_for(Listener::predicate(|event| {
                event.detail.as_ref().is_some_and(|d| d["size"] == json!("big"))
            }))),
            b_sync(Idiom::new().with_request(Event::new("matched"))),
        ]),
    )]);
    let _feedback = program.use_feedback(Handlers::new().on("matched", log_handler(&log, "matched")));

    program.trigger(Event::new("sample").with_detail(json!({ "size": "small" })));
    assert!(log.borrow().is_empty());

    program.trigger(Event::new("sample").with_detail(json!({ "size": "big" })));
    assert_eq!(*log.borrow(), ["matched"]);
}
