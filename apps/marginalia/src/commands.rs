use crate::charset::decode_page;
use mg_anchor::AnchorConfig;
use mg_anchor::SelectionRecord;
use mg_core::MarginaliaError;
use mg_core::MarginaliaResult;
use mg_ipc::ChannelConfig;
use mg_ipc::EndpointRole;
use mg_ipc::IpcMessage;
use mg_ipc::local_channel_pair;
use mg_page::PageSession;
use mg_storage::HighlightStore;
use mg_storage::StoreConfig;
use mg_storage::StoredHighlight;
use mg_storage::site_of;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::debug;
use tracing::info;

const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) struct CaptureArgs {
    pub page: PathBuf,
    pub url: String,
    pub text: String,
    pub occurrence: usize,
    pub note: Option<String>,
    pub store: Option<PathBuf>,
}

pub(crate) enum RecordSource {
    File(PathBuf),
    Stored { note: String, store: PathBuf },
}

pub(crate) fn capture(args: CaptureArgs) -> MarginaliaResult<String> {
    let mut page = load_page(&args.page, &args.url)?;
    page.select_text(&args.text, args.occurrence)?;

    let (reply, _) = exchange(page, IpcMessage::CaptureSelection { request_id: 1 })?;
    let IpcMessage::SelectionCaptured {
        record: Some(record),
        ..
    } = reply
    else {
        return Err(MarginaliaError::new(
            "cli.capture_empty",
            "selection produced no record",
        ));
    };

    if let (Some(note), Some(store)) = (args.note, args.store) {
        let highlight = StoredHighlight {
            url: args.url,
            record: record.clone(),
        };
        open_store(store).save(&note, &highlight)?;
        info!(note = note.as_str(), "stored highlight");
    }

    Ok(record)
}

pub(crate) fn relocate(page_path: &Path, url: &str, source: RecordSource) -> MarginaliaResult<String> {
    let (origin_url, record) = match source {
        RecordSource::File(path) => (url.to_owned(), read_file(&path)?),
        RecordSource::Stored { note, store } => {
            let site = site_of(url)?;
            let stored = open_store(store).load(&site, &note)?.ok_or_else(|| {
                MarginaliaError::new(
                    "cli.note_unknown",
                    format!("no stored highlight `{note}` for {site}"),
                )
            })?;
            (stored.url, stored.record)
        }
    };

    let page = load_page(page_path, url)?;
    let (reply, page) = exchange(
        page,
        IpcMessage::RelocateSelection {
            request_id: 1,
            origin_url,
            record,
        },
    )?;

    let IpcMessage::SelectionRelocated {
        found, navigate_to, ..
    } = reply
    else {
        return Err(MarginaliaError::new(
            "cli.reply_unexpected",
            "page answered with the wrong message kind",
        ));
    };

    let mut out = format!("found: {found}");
    if let Some(target) = navigate_to {
        out.push_str(&format!("\nnavigate: {target}"));
    } else if found {
        let document = page.document();
        let selected = document
            .selection()
            .and_then(|selection| document.range_text(&selection.to_range()))
            .unwrap_or_default();
        out.push_str(&format!("\nselected: {selected}"));
    }
    Ok(out)
}

pub(crate) fn show(store: PathBuf, site: &str) -> MarginaliaResult<String> {
    let store = open_store(store);
    let mut lines = Vec::new();
    for note in store.note_ids(site)? {
        let Some(stored) = store.load(site, &note)? else {
            continue;
        };
        let phrase = SelectionRecord::from_json(&stored.record)
            .map(|record| record.phrase)
            .unwrap_or_default();
        lines.push(format!("{note}\t{}\t{phrase}", stored.url));
    }
    Ok(lines.join("\n"))
}

fn load_page(path: &Path, url: &str) -> MarginaliaResult<PageSession> {
    let body = fs::read(path).map_err(|error| {
        MarginaliaError::new(
            "cli.page_read_failed",
            format!("failed to read page `{}`: {error}", path.display()),
        )
    })?;
    let html = decode_page(&body);
    debug!(path = %path.display(), chars = html.len(), "loaded page");
    PageSession::from_html(url, &html, AnchorConfig::default())
}

fn read_file(path: &Path) -> MarginaliaResult<String> {
    fs::read_to_string(path).map_err(|error| {
        MarginaliaError::new(
            "cli.record_read_failed",
            format!("failed to read record `{}`: {error}", path.display()),
        )
    })
}

fn open_store(root: PathBuf) -> HighlightStore {
    HighlightStore::new(StoreConfig::default()).with_persistent_root(root)
}

/// Runs the page on its own thread behind a channel pair, sends one request
/// and hands back the reply together with the page.
fn exchange(page: PageSession, request: IpcMessage) -> MarginaliaResult<(IpcMessage, PageSession)> {
    let (background, content) = local_channel_pair(
        ChannelConfig::hardened(EndpointRole::Background)?,
        ChannelConfig::hardened(EndpointRole::ContentScript)?,
    )?;

    let worker = thread::spawn(move || {
        let mut page = page;
        let served = page.serve(&content);
        (page, served)
    });

    background.send(&request)?;
    let reply = background.recv_timeout(REPLY_TIMEOUT);
    drop(background);

    let (page, served) = worker.join().map_err(|_| {
        MarginaliaError::new("cli.page_thread_panicked", "page session thread panicked")
    })?;
    served?;
    Ok((reply?, page))
}

#[cfg(test)]
mod tests {
    use super::CaptureArgs;
    use super::RecordSource;
    use super::capture;
    use super::relocate;
    use super::show;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    const URL: &str = "https://notes.example.com/essay";

    fn temp_dir(label: &str) -> PathBuf {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|value| value.as_nanos())
            .unwrap_or_default();
        let dir = std::env::temp_dir().join(format!("marginalia-cli-{label}-{stamp}"));
        assert!(std::fs::create_dir_all(&dir).is_ok());
        dir
    }

    fn write_page(dir: &std::path::Path) -> PathBuf {
        let page = dir.join("essay.html");
        let html = "<html><body><h1>Essay</h1>\
            <p class=\"body\">Margins are where readers talk back.</p>\
            <p class=\"body\">Readers talk back in pencil.</p></body></html>";
        assert!(std::fs::write(&page, html).is_ok());
        page
    }

    #[test]
    fn capture_store_show_and_relocate() {
        let dir = temp_dir("roundtrip");
        let page = write_page(&dir);
        let store = dir.join("store");

        let record = capture(CaptureArgs {
            page: page.clone(),
            url: URL.to_owned(),
            text: "talk back".to_owned(),
            occurrence: 2,
            note: Some("pencil".to_owned()),
            store: Some(store.clone()),
        })
        .unwrap_or_else(|_| unreachable!());
        assert!(record.contains("\"phrase\":\"talk back\""));

        let listing = show(store.clone(), "notes.example.com").unwrap_or_else(|_| unreachable!());
        assert_eq!(listing, format!("pencil\t{URL}\ttalk back"));

        let relocated = relocate(
            &page,
            URL,
            RecordSource::Stored {
                note: "pencil".to_owned(),
                store: store.clone(),
            },
        )
        .unwrap_or_else(|_| unreachable!());
        assert_eq!(relocated, "found: true\nselected: talk back");

        let elsewhere = relocate(
            &page,
            "https://notes.example.com/other",
            RecordSource::Stored {
                note: "pencil".to_owned(),
                store,
            },
        )
        .unwrap_or_else(|_| unreachable!());
        assert_eq!(elsewhere, format!("found: false\nnavigate: {URL}"));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn relocate_from_record_file_and_unknown_note() {
        let dir = temp_dir("file");
        let page = write_page(&dir);
        let record = capture(CaptureArgs {
            page: page.clone(),
            url: URL.to_owned(),
            text: "in pencil".to_owned(),
            occurrence: 1,
            note: None,
            store: None,
        })
        .unwrap_or_else(|_| unreachable!());
        let record_path = dir.join("record.json");
        assert!(std::fs::write(&record_path, record).is_ok());

        let relocated = relocate(&page, URL, RecordSource::File(record_path))
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(relocated, "found: true\nselected: in pencil");

        let missing = relocate(
            &page,
            URL,
            RecordSource::Stored {
                note: "absent".to_owned(),
                store: dir.join("store"),
            },
        );
        assert!(missing.is_err());
        if let Err(error) = missing {
            assert_eq!(error.code, "cli.note_unknown");
        }

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn capture_reports_missing_text() {
        let dir = temp_dir("missing");
        let page = write_page(&dir);
        let captured = capture(CaptureArgs {
            page,
            url: URL.to_owned(),
            text: "ink".to_owned(),
            occurrence: 1,
            note: None,
            store: None,
        });
        assert!(captured.is_err());
        if let Err(error) = captured {
            assert_eq!(error.code, "page.text_not_found");
        }

        let _ = std::fs::remove_dir_all(dir);
    }
}
