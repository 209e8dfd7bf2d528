//! Word list screen: a controller announces added words, a view shows a
//! notice for each one while it is started.
//!
//! Run with `RUST_LOG=eventscope=debug cargo run --example word_list` to see
//! the subscription lifecycle.

use std::sync::{Arc, Mutex};

use eventscope::{CompositeSubscription, EventChannel, EventscopeResult, Scope, Scoped, Teardown};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
enum WordEvent {
    NewWordAdded { word: String },
}

struct WordController {
    words: Mutex<Vec<String>>,
    events: EventChannel<WordEvent>,
}

impl WordController {
    fn new() -> Self {
        Self {
            words: Mutex::new(vec!["Bogus".to_string(), "Magic".to_string()]),
            events: EventChannel::named("word-controller"),
        }
    }

    fn add_word(&self, word: &str) {
        self.words
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(word.to_string());
        self.events.emit(WordEvent::NewWordAdded {
            word: word.to_string(),
        });
    }

    fn word_count(&self) -> usize {
        self.words
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

struct WordListView {
    controller: Scoped<WordController>,
    notices: Arc<Mutex<Vec<String>>>,
    tokens: CompositeSubscription,
}

impl WordListView {
    fn new(controller: Scoped<WordController>) -> Self {
        Self {
            controller,
            notices: Arc::new(Mutex::new(Vec::new())),
            tokens: CompositeSubscription::new(),
        }
    }

    fn on_start(&mut self) {
        let notices = Arc::clone(&self.notices);
        let sub = self.controller.with(|c| {
            c.events.subscribe(move |event: &WordEvent| match event {
                WordEvent::NewWordAdded { word } => {
                    info!(%word, "showing notice");
                    notices
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner)
                        .push(format!("Added {word}"));
                }
            })
        });
        if let Some(sub) = sub {
            self.tokens += sub;
        }
    }

    fn on_stop(&mut self) -> EventscopeResult<()> {
        std::mem::take(&mut self.tokens).dispose_all()?;
        Ok(())
    }
}

fn main() -> EventscopeResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut scope = Scope::new("word-list");
    let controller = scope.provide(WordController::new());
    scope.on_exit(Teardown::new("save-state", || info!("word list state saved")));

    let mut view = WordListView::new(controller.clone());

    view.on_start();
    controller.with(|c| c.add_word("pen"));
    view.on_stop()?;

    // Stopped: this one is not shown.
    controller.with(|c| c.add_word("cup"));

    view.on_start();
    controller.with(|c| c.add_word("ink"));

    info!(
        words = controller.with(WordController::word_count).unwrap_or(0),
        notices = ?view.notices.lock().unwrap_or_else(std::sync::PoisonError::into_inner),
        "before exit"
    );

    // Leaving the screen drops the controller and its channel; the view's
    // outstanding subscription becomes inactive.
    scope.exit()?;
    view.on_stop()?;

    Ok(())
}
