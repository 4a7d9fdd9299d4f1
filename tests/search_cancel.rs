use lumispec::cancel::{CancellationToken, SearchObserver};
use lumispec::library::{search, Library, LibraryEntry, SearchOptions, SearchOutcome};
use lumispec::processing::linspace;
use lumispec::{AxisUnit, Spectrum};

fn band(centre: f64) -> Spectrum {
    let axis = linspace(200.0, 3200.0, 600);
    let y = axis
        .iter()
        .map(|x| {
            let z = (x - centre) / 15.0;
            0.5 + (-0.5 * z * z).exp()
        })
        .collect();
    Spectrum::new(axis, y, AxisUnit::RamanShift).unwrap()
}

fn library(n: usize) -> Library {
    (0..n)
        .map(|i| {
            let key = format!("entry-{i:03}");
            let entry = LibraryEntry::new(key.clone(), band(400.0 + 20.0 * i as f64));
            (key, entry)
        })
        .collect()
}

/// Cancels once the first entry has been handed out.
#[derive(Default)]
struct CancelAfterFirst {
    progress_calls: usize,
}

impl SearchObserver for CancelAfterFirst {
    fn on_progress(&mut self, _index: usize, _total: usize) {
        self.progress_calls += 1;
    }

    fn is_cancelled(&self) -> bool {
        self.progress_calls > 1
    }
}

fn options() -> SearchOptions {
    SearchOptions {
        min_overlap: 100.0,
        preprocess_library: false,
        ..SearchOptions::default()
    }
}

#[test]
fn cancelling_after_first_entry_reports_cancelled() {
    let lib = library(100);
    let mut observer = CancelAfterFirst::default();
    let outcome = search(&band(1000.0), &lib, None, &options(), &mut observer).unwrap();
    assert_eq!(outcome, SearchOutcome::Cancelled);
    assert!(outcome.is_cancelled());
    assert!(outcome.results().is_empty());
    assert_eq!(observer.progress_calls, 2);
}

#[test]
fn pre_cancelled_token_scores_nothing() {
    let token = CancellationToken::new();
    token.cancel();
    let mut observer = token.clone();
    let outcome = search(&band(1000.0), &library(5), None, &options(), &mut observer).unwrap();
    assert!(outcome.is_cancelled());
}

#[test]
fn uncancelled_search_is_distinguishable_from_cancelled() {
    let token = CancellationToken::new();
    let mut observer = token.clone();
    let outcome = search(&band(1000.0), &library(100), None, &options(), &mut observer).unwrap();
    assert!(!outcome.is_cancelled());
    assert_eq!(outcome.results().len(), 5);
    assert_eq!(outcome.results()[0].id, "entry-030");

    let empty = search(&band(1000.0), &Library::new(), None, &options(), &mut observer).unwrap();
    assert_eq!(empty, SearchOutcome::Completed(vec![]));
    assert_ne!(empty, SearchOutcome::Cancelled);
}
