//! Walkthrough of a multi-step clinical data-entry flow.
//!
//! Drives a prescription wizard end to end: sequential navigation with a
//! validation gate, a confirmation modal that traps focus and restores it
//! on close, and the projected step indicator after each phase.
//!
//! Run with: `cargo run --example form_wizard`

use anyhow::Result;
use focal::prelude::*;
use rustc_hash::FxHashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn print_steps(engine: &FocusEngine, completed: &FxHashSet<String>) {
    let skipped = FxHashSet::default();
    let view = engine.project_steps(&StepInputs::new(completed, &skipped));
    for step in view {
        let marker = match step.status {
            StepStatus::Current => ">",
            StepStatus::Complete => "x",
            StepStatus::Disabled => "-",
            StepStatus::Upcoming => " ",
        };
        let lock = if step.is_clickable { "" } else { " (locked)" };
        println!("  [{marker}] {}{lock}", step.label);
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let engine = FocusEngine::new(Arc::new(ImmediateScheduler));

    engine.subscribe(|event| {
        if let EngineEvent::ActiveChanged { current, reason, .. } = event {
            println!("  -> active: {:?} ({reason:?})", current.as_deref());
        }
    });

    // A dosage field that refuses to hand focus onward until filled in.
    let dosage_filled = Arc::new(AtomicBool::new(false));
    let filled = dosage_filled.clone();

    engine.register(
        FocusableElement::builder("patient")
            .order(1)
            .scope("prescription")
            .required(true)
            .step("Patient")
            .build(),
    )?;
    engine.register(
        FocusableElement::builder("medication")
            .order(2)
            .scope("prescription")
            .required(true)
            .step("Medication")
            .build(),
    )?;
    engine.register(
        FocusableElement::builder("dosage")
            .order(3)
            .scope("prescription")
            .required(true)
            .step("Dosage")
            .can_leave(Validator::sync(move |_| filled.load(Ordering::SeqCst)))
            .build(),
    )?;
    engine.register(
        FocusableElement::builder("review")
            .order(4)
            .scope("prescription")
            .step("Review")
            .build(),
    )?;

    let mut completed = FxHashSet::default();

    println!("Filling in the form:");
    engine.focus_first(NavOptions::default()).await;
    completed.insert("patient".to_string());
    engine.focus_next(NavOptions::default()).await;
    completed.insert("medication".to_string());
    engine.focus_next(NavOptions::default()).await;

    println!("\nDosage is empty, so the leave gate holds focus:");
    let moved = engine.focus_next(NavOptions::default()).await;
    println!("  focus_next -> {moved}");

    println!("\nAfter entering a dosage the gate opens:");
    dosage_filled.store(true, Ordering::SeqCst);
    completed.insert("dosage".to_string());
    engine.focus_next(NavOptions::default()).await;

    println!("\nStep indicator:");
    print_steps(&engine, &completed);

    println!("\nUndo walks back through committed transitions, redo replays:");
    engine.undo_focus();
    engine.redo_focus();

    println!("\nAn interaction warning interrupts as a focus-trapping modal:");
    engine.push_scope(FocusScope::modal("interaction-warning").auto_activate_first(true))?;
    engine.register(
        FocusableElement::builder("acknowledge")
            .order(1)
            .scope("interaction-warning")
            .build(),
    )?;
    engine.focus_first(NavOptions::default()).await;

    // Trapped: tabbing wraps inside the modal, the page is unreachable.
    engine.focus_next(NavOptions::default()).await;
    let escaped = engine.focus_field("patient", FocusReason::Pointer).await;
    println!("  direct jump out of the trap -> {escaped}");

    println!("\nClosing the modal restores focus to the review field:");
    engine.pop_scope()?;
    engine.unregister("acknowledge");

    println!("\nFinal step indicator:");
    print_steps(&engine, &completed);

    Ok(())
}
