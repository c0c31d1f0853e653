//! Essay grading example.
//!
//! Shows corrective retries: the scripted model first answers with a grade
//! outside the allowed classes, gets a correction and fixes it. A trace
//! callback prints what the loop does.
//!
//! Run with:
//! ```bash
//! RUST_LOG=debug cargo run -p sigil --example grading --features tracing-integration
//! ```

use serde_json::json;
use sigil::prelude::*;
use sigil::TraceEvent;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let generator = Generator::parse(
        r#""Grade a short essay" essay -> grade:class "A, B, C, D", strengths:string[], feedback"#,
    )?
    .with_assertion(Assertion::new(
        |v: &Values| v.get("feedback").and_then(|f| f.as_str()).is_some_and(|f| f.ends_with('.')),
        "Feedback must be written as full sentences",
    ));

    let model = MockModel::new("scripted-grader")
        .with_text_response("Grade: B+\nStrengths:\n- structure\nFeedback: good")
        .with_text_response(
            "Grade: B\nStrengths:\n- clear structure\n- good examples\nFeedback: Tighten the conclusion.",
        );

    let options = GenerateOptions::new().max_retries(3).on_trace(|event| match event {
        TraceEvent::Correction { attempt, message, .. } => {
            println!("correction after attempt {attempt}:\n  {message}\n");
        }
        TraceEvent::Response { content, .. } => println!("model said:\n  {content:?}\n"),
        _ => {}
    });

    let inputs = json!({"essay": "Rust makes systems programming approachable..."});
    let output = generator
        .forward(&model, inputs.as_object().cloned().unwrap_or_default(), &options)
        .await?;

    println!("grade:     {}", output.get_str("grade").unwrap_or("-"));
    println!("strengths: {}", output.get("strengths").cloned().unwrap_or_default());
    println!("feedback:  {}", output.get_str("feedback").unwrap_or("-"));
    println!("retries:   {}", output.retries);
    Ok(())
}
