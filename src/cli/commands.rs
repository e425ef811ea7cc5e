use crate::backend::HubAdapter;
use crate::cli::table::print_model_table;
use crate::error::Result;
use crate::model::ModelInfo;
use std::io::{BufRead, Write};
use std::path::Path;

/// Destructive verbs that run over a confirmed batch of models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchAction {
    Update,
    Remove,
}

impl BatchAction {
    fn verb(self) -> &'static str {
        match self {
            BatchAction::Update => "update",
            BatchAction::Remove => "remove",
        }
    }

    fn past_tense(self) -> &'static str {
        match self {
            BatchAction::Update => "updated",
            BatchAction::Remove => "removed",
        }
    }

    fn progressive(self) -> &'static str {
        match self {
            BatchAction::Update => "Updating",
            BatchAction::Remove => "Removing",
        }
    }

    fn apply(self, adapter: &dyn HubAdapter, model: &ModelInfo) -> Result<()> {
        match self {
            BatchAction::Update => adapter.update_model(model),
            BatchAction::Remove => adapter.remove_model(model),
        }
    }
}

pub fn list<W: Write>(
    adapter: &dyn HubAdapter,
    pattern: Option<&str>,
    local_dir: Option<&Path>,
    out: &mut W,
) -> Result<()> {
    let models = adapter.list_models(pattern, local_dir)?;
    print_model_table(out, &models)?;
    Ok(())
}

pub fn download<W: Write>(
    adapter: &dyn HubAdapter,
    model_id: &str,
    local_dir: Option<&Path>,
    out: &mut W,
) -> Result<()> {
    let model_path = local_dir.map(|dir| dir.join(model_id));
    let target = match &model_path {
        Some(path) => format!("<{}>", path.display()),
        None => "cache".to_string(),
    };
    writeln!(out, "Downloading <{}> to {}...", model_id, target)?;
    out.flush()?;

    adapter.download_model(model_id, model_path.as_deref())?;
    writeln!(out, "Downloaded <{}>.", model_id)?;
    Ok(())
}

/// Lists matching models, asks for confirmation, then applies `action` to
/// each model in order. The first failure stops the batch.
pub fn run_batch<R: BufRead, W: Write>(
    adapter: &dyn HubAdapter,
    action: BatchAction,
    pattern: Option<&str>,
    local_dir: Option<&Path>,
    input: &mut R,
    out: &mut W,
) -> Result<()> {
    let models = adapter.list_models(pattern, local_dir)?;
    if models.is_empty() {
        writeln!(out, "No models found.")?;
        return Ok(());
    }

    writeln!(out, "The following models will be {}:", action.past_tense())?;
    print_model_table(out, &models)?;
    if !confirm(
        &format!("Do you want to {} the {} models? [y/N] ", action.verb(), models.len()),
        input,
        out,
    )? {
        tracing::debug!("{} aborted by user", action.verb());
        return Ok(());
    }

    let total = models.len();
    for (index, model) in models.iter().enumerate() {
        writeln!(
            out,
            "[{}/{}] {} <{}> in <{}>...",
            index + 1,
            total,
            action.progressive(),
            model.id,
            model.path.display()
        )?;
        out.flush()?;
        action.apply(adapter, model)?;
    }
    Ok(())
}

fn confirm<R: BufRead, W: Write>(prompt: &str, input: &mut R, out: &mut W) -> Result<bool> {
    write!(out, "{}", prompt)?;
    out.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests::model;
    use crate::error::Error;
    use std::cell::RefCell;
    use std::io::Cursor;
    use std::path::PathBuf;

    /// Serves a fixed model list and records every mutating call.
    struct RecordingAdapter {
        models: Vec<ModelInfo>,
        fail_on: Option<&'static str>,
        calls: RefCell<Vec<String>>,
    }

    impl RecordingAdapter {
        fn new(ids: &[&str]) -> Self {
            Self {
                models: ids.iter().map(|id| model(id)).collect(),
                fail_on: None,
                calls: RefCell::new(Vec::new()),
            }
        }

        fn record(&self, call: String, id: &str) -> Result<()> {
            self.calls.borrow_mut().push(call);
            if self.fail_on == Some(id) {
                return Err(Error::DownloadFailed(format!("{} is unreachable", id)));
            }
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl HubAdapter for RecordingAdapter {
        fn cache_dir(&self) -> Result<PathBuf> {
            Ok(PathBuf::from("/models"))
        }

        fn list_models(&self, pattern: Option<&str>, _local_dir: Option<&Path>) -> Result<Vec<ModelInfo>> {
            crate::backend::filter_and_sort(self.models.clone(), pattern)
        }

        fn download_model(&self, model_id: &str, model_path: Option<&Path>) -> Result<()> {
            self.record(format!("download {} {:?}", model_id, model_path), model_id)
        }

        fn update_model(&self, model: &ModelInfo) -> Result<()> {
            self.record(format!("update {}", model.id), &model.id)
        }

        fn remove_model(&self, model: &ModelInfo) -> Result<()> {
            self.record(format!("remove {}", model.id), &model.id)
        }
    }

    fn run(adapter: &RecordingAdapter, action: BatchAction, answer: &str) -> (Result<()>, String) {
        let mut input = Cursor::new(answer.as_bytes().to_vec());
        let mut out = Vec::new();
        let result = run_batch(adapter, action, None, None, &mut input, &mut out);
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_declined_confirmation_mutates_nothing() {
        for answer in ["n\n", "N\n", "", "\n", "yes\n", "maybe\n"] {
            for action in [BatchAction::Update, BatchAction::Remove] {
                let adapter = RecordingAdapter::new(&["acme/a", "acme/b"]);
                let (result, output) = run(&adapter, action, answer);
                assert!(result.is_ok());
                assert!(adapter.calls().is_empty(), "answer {:?} mutated models", answer);
                assert!(output.contains(&format!("Do you want to {} the 2 models? [y/N] ", action.verb())));
            }
        }
    }

    #[test]
    fn test_confirmed_update_runs_in_order() {
        let adapter = RecordingAdapter::new(&["zeta/z", "acme/a", "acme/b"]);
        let (result, output) = run(&adapter, BatchAction::Update, "Y\n");
        assert!(result.is_ok());
        assert_eq!(adapter.calls(), vec!["update acme/a", "update acme/b", "update zeta/z"]);
        assert!(output.starts_with("The following models will be updated:\n"));
        assert!(output.contains("[1/3] Updating <acme/a> in </models/acme/a>..."));
        assert!(output.contains("[3/3] Updating <zeta/z> in </models/zeta/z>..."));
    }

    #[test]
    fn test_confirmed_remove() {
        let adapter = RecordingAdapter::new(&["acme/a"]);
        let (result, output) = run(&adapter, BatchAction::Remove, "  y  \n");
        assert!(result.is_ok());
        assert_eq!(adapter.calls(), vec!["remove acme/a"]);
        assert!(output.contains("The following models will be removed:"));
        assert!(output.contains("[1/1] Removing <acme/a> in </models/acme/a>..."));
    }

    #[test]
    fn test_batch_stops_at_first_failure() {
        let mut adapter = RecordingAdapter::new(&["m/1", "m/2", "m/3", "m/4", "m/5"]);
        adapter.fail_on = Some("m/3");
        let (result, output) = run(&adapter, BatchAction::Update, "y\n");

        assert!(matches!(result, Err(Error::DownloadFailed(_))));
        assert_eq!(adapter.calls(), vec!["update m/1", "update m/2", "update m/3"]);
        assert!(output.contains("[3/5] Updating <m/3>"));
        assert!(!output.contains("[4/5]"));
    }

    #[test]
    fn test_no_matching_models_skips_prompt() {
        let adapter = RecordingAdapter::new(&["acme/a"]);
        let mut input = Cursor::new(b"y\n".to_vec());
        let mut out = Vec::new();
        run_batch(&adapter, BatchAction::Remove, Some("zeta/*"), None, &mut input, &mut out).unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "No models found.\n");
        assert!(adapter.calls().is_empty());
    }

    #[test]
    fn test_list_prints_summary() {
        let adapter = RecordingAdapter::new(&["acme/b", "acme/a"]);
        let mut out = Vec::new();
        list(&adapter, Some("acme/*"), None, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        let a = text.find("acme/a").unwrap();
        let b = text.find("acme/b").unwrap();
        assert!(a < b);
        assert!(text.ends_with("Scanned 2 repo(s) for a total of 0.0.\n"));
    }

    #[test]
    fn test_download_messages() {
        let adapter = RecordingAdapter::new(&[]);
        let mut out = Vec::new();
        download(&adapter, "acme/widget", None, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Downloading <acme/widget> to cache...\n"));
        assert_eq!(adapter.calls(), vec!["download acme/widget None"]);

        let mut out = Vec::new();
        download(&adapter, "acme/widget", Some(Path::new("/data")), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Downloading <acme/widget> to </data/acme/widget>...\n"));
        assert_eq!(adapter.calls()[1], "download acme/widget Some(\"/data/acme/widget\")");
    }
}
