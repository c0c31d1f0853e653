//! Streaming example.
//!
//! Prints a string field as it arrives, then the settled values.
//!
//! Run with:
//! ```bash
//! cargo run -p sigil --example streaming
//! ```

use futures::StreamExt;
use serde_json::json;
use sigil::prelude::*;
use std::io::{self, Write};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let generator = Generator::parse("topic -> story, wordCount:number")?;
    let model: BoxedModel = Arc::new(
        MockModel::new("scripted-writer").with_chunk_chars(3).with_text_response(
            "Story: Once upon a time a borrow checker learned to smile.\nWord Count: 10",
        ),
    );

    let inputs = json!({"topic": "compilers"}).as_object().cloned().unwrap_or_default();
    let mut stream = generator.forward_stream(model, inputs, GenerateOptions::new());

    while let Some(event) = stream.next().await {
        match event? {
            GenerateEvent::AttemptStart { step, attempt } => {
                println!("--- step {step}, attempt {attempt} ---");
            }
            GenerateEvent::Delta(delta) => match delta.delta {
                FieldDelta::Text(text) if delta.field == "story" => {
                    print!("{text}");
                    io::stdout().flush()?;
                }
                FieldDelta::Text(text) => println!("\n{}: {text}", delta.field),
                FieldDelta::Value(value) => println!("\n{}: {value}", delta.field),
            },
            GenerateEvent::FunctionsExecuted { names, .. } => println!("\nran {names:?}"),
            GenerateEvent::Done(output) => {
                println!("\n---\n{}", serde_json::to_string_pretty(&output.values)?);
            }
        }
    }
    Ok(())
}
