use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};

use snafu::{OptionExt, Snafu};

use mentor_backend::{
    BackendError, GENERIC_ERROR_TEXT, ScriptedBackend, StreamRequest, UNAUTHORIZED_ERROR_TEXT,
    Utf8StreamDecoder,
};
use mentor_chat::chat::{
    ConversationId, MENTOR_GREETING, MessageStatus, StreamEventMapped, StreamSessionId,
    StreamTarget, USER_MESSAGE_LIMIT, ViewportMetrics,
};
use mentor_chat::{ContextMode, MentorPopup, PopupOptions};
use mentor_render::MemoryClipboard;
use mentor_store::{MemoryStore, MemoryVault};

#[derive(Debug, Clone)]
struct RunnerArgs {
    scenario: Scenario,
}

#[derive(Debug, Clone, Copy)]
enum Scenario {
    StreamAccumulation,
    TrailingReplace,
    MessageCap,
    ScrollFollow,
    ErrorPaths,
    EmptySubmit,
    SilentAbort,
    CopyFeedback,
    Utf8Split,
    IdentityProbe,
    All,
}

impl Scenario {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "stream_accumulation" => Some(Self::StreamAccumulation),
            "trailing_replace" => Some(Self::TrailingReplace),
            "message_cap" => Some(Self::MessageCap),
            "scroll_follow" => Some(Self::ScrollFollow),
            "error_paths" => Some(Self::ErrorPaths),
            "empty_submit" => Some(Self::EmptySubmit),
            "silent_abort" => Some(Self::SilentAbort),
            "copy_feedback" => Some(Self::CopyFeedback),
            "utf8_split" => Some(Self::Utf8Split),
            "identity_probe" => Some(Self::IdentityProbe),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::StreamAccumulation => "stream_accumulation",
            Self::TrailingReplace => "trailing_replace",
            Self::MessageCap => "message_cap",
            Self::ScrollFollow => "scroll_follow",
            Self::ErrorPaths => "error_paths",
            Self::EmptySubmit => "empty_submit",
            Self::SilentAbort => "silent_abort",
            Self::CopyFeedback => "copy_feedback",
            Self::Utf8Split => "utf8_split",
            Self::IdentityProbe => "identity_probe",
            Self::All => "all",
        }
    }
}

#[derive(Debug, Snafu)]
enum RunnerError {
    #[snafu(display("missing required --scenario argument"))]
    MissingScenario { stage: &'static str },
    #[snafu(display("missing value for argument '{arg}'"))]
    MissingArgumentValue {
        stage: &'static str,
        arg: &'static str,
    },
    #[snafu(display("unknown scenario '{raw}'"))]
    UnknownScenario { stage: &'static str, raw: String },
    #[snafu(display("unknown argument '{raw}'"))]
    UnknownArgument { stage: &'static str, raw: String },
    #[snafu(display("scenario '{scenario}' failed: {reason}"))]
    ScenarioFailed {
        stage: &'static str,
        scenario: &'static str,
        reason: String,
    },
}

type RunnerResult<T> = Result<T, RunnerError>;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Scenario internals log through tracing; route that to stderr so the
    // key=value protocol on stdout stays parseable.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    if let Err(error) = run().await {
        println!("runner_ok=false");
        eprintln!("runner_error={error}");
        std::process::exit(1);
    }
}

async fn run() -> RunnerResult<()> {
    let args = parse_args(env::args().skip(1))?;
    println!("scenario={}", args.scenario.name());

    match args.scenario {
        Scenario::StreamAccumulation => run_stream_accumulation().await,
        Scenario::TrailingReplace => run_trailing_replace(),
        Scenario::MessageCap => run_message_cap().await,
        Scenario::ScrollFollow => run_scroll_follow(),
        Scenario::ErrorPaths => run_error_paths().await,
        Scenario::EmptySubmit => run_empty_submit().await,
        Scenario::SilentAbort => run_silent_abort().await,
        Scenario::CopyFeedback => run_copy_feedback().await,
        Scenario::Utf8Split => run_utf8_split(),
        Scenario::IdentityProbe => run_identity_probe().await,
        Scenario::All => run_all().await,
    }
}

fn parse_args(args: impl IntoIterator<Item = String>) -> RunnerResult<RunnerArgs> {
    let mut scenario = None;
    let mut pending = args.into_iter();

    while let Some(argument) = pending.next() {
        match argument.as_str() {
            "--scenario" => {
                let value = pending.next().context(MissingArgumentValueSnafu {
                    stage: "parse-args-scenario-value",
                    arg: "--scenario",
                })?;

                let parsed = Scenario::parse(&value).context(UnknownScenarioSnafu {
                    stage: "parse-args-scenario",
                    raw: value,
                })?;
                scenario = Some(parsed);
            }
            _ => {
                return UnknownArgumentSnafu {
                    stage: "parse-args",
                    raw: argument,
                }
                .fail();
            }
        }
    }

    Ok(RunnerArgs {
        scenario: scenario.context(MissingScenarioSnafu {
            stage: "parse-args-scenario-required",
        })?,
    })
}

fn anonymous_popup(backend: ScriptedBackend) -> (MentorPopup, Arc<ScriptedBackend>) {
    let backend = Arc::new(backend);
    let popup = MentorPopup::new(
        PopupOptions::default(),
        backend.clone(),
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryVault::new()),
    );
    (popup, backend)
}

fn chat_target(request: &StreamRequest) -> StreamTarget {
    StreamTarget::new(
        ConversationId::new(request.target.conversation_id),
        StreamSessionId::new(request.target.session_id),
    )
}

async fn run_stream_accumulation() -> RunnerResult<()> {
    let (mut popup, _) = anonymous_popup(ScriptedBackend::streaming(["Hello", " wor", "ld"]));
    popup.set_draft("hi");
    popup.submit().await;

    let trailing = popup.messages().last().context(ScenarioFailedSnafu {
        stage: "scenario-stream-accumulation-trailing",
        scenario: "stream_accumulation",
        reason: "conversation is empty after submit".to_string(),
    })?;

    let accumulated = trailing.content == "Hello world"
        && trailing.status == MessageStatus::Done
        && popup.messages().len() == 3;
    println!("final_content={}", trailing.content);
    println!("stream_accumulation={accumulated}");
    if !accumulated {
        return ScenarioFailedSnafu {
            stage: "scenario-stream-accumulation-check",
            scenario: "stream_accumulation",
            reason: format!(
                "expected 'Hello world' done across 3 messages, got '{}' over {}",
                trailing.content,
                popup.messages().len()
            ),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

fn run_trailing_replace() -> RunnerResult<()> {
    let (mut popup, _) = anonymous_popup(ScriptedBackend::streaming(["unused"]));
    popup.set_draft("hi");
    let request = popup.begin_exchange().context(ScenarioFailedSnafu {
        stage: "scenario-trailing-replace-begin",
        scenario: "trailing_replace",
        reason: "submission was refused".to_string(),
    })?;
    let target = chat_target(&request);

    let count_before = popup.messages().len();
    popup.handle_stream_event(StreamEventMapped::delta(target, "Step "));
    popup.handle_stream_event(StreamEventMapped::delta(target, "one"));
    popup.handle_stream_event(StreamEventMapped::delta(target, ", then two"));
    let count_after = popup.messages().len();
    popup.handle_stream_event(StreamEventMapped::done(target));

    let stable = count_before == 3 && count_after == 3;
    println!("count_before={count_before}");
    println!("count_after={count_after}");
    println!("trailing_replace={stable}");
    if !stable {
        return ScenarioFailedSnafu {
            stage: "scenario-trailing-replace-check",
            scenario: "trailing_replace",
            reason: format!("message count moved from {count_before} to {count_after}"),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_message_cap() -> RunnerResult<()> {
    let (mut popup, backend) = anonymous_popup(ScriptedBackend::streaming(["ok"]));

    for turn in 0..USER_MESSAGE_LIMIT {
        popup.set_draft(format!("question {turn}"));
        popup.submit().await;
    }
    let at_cap = popup.conversation().user_message_count();

    popup.set_draft("one more");
    let refused = popup.submit_disabled();
    popup.submit().await;
    let after_refusal = popup.conversation().user_message_count();

    let capped = at_cap == USER_MESSAGE_LIMIT
        && refused
        && after_refusal == USER_MESSAGE_LIMIT
        && backend.stream_calls() == USER_MESSAGE_LIMIT
        && popup.draft() == "one more";
    println!("user_messages={after_refusal}");
    println!("message_cap={capped}");
    if !capped {
        return ScenarioFailedSnafu {
            stage: "scenario-message-cap-check",
            scenario: "message_cap",
            reason: format!(
                "expected cap at {USER_MESSAGE_LIMIT}, saw {after_refusal} messages and {} calls",
                backend.stream_calls()
            ),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

fn run_scroll_follow() -> RunnerResult<()> {
    let (mut popup, _) = anonymous_popup(ScriptedBackend::streaming(["x"]));

    // 290 + 100 = 390 against a 400 tall document: inside the 10 px band.
    popup.observe_scroll(ViewportMetrics::new(290.0, 100.0, 400.0));
    let following_at_band = !popup.show_scroll_affordance();

    popup.observe_scroll(ViewportMetrics::new(289.0, 100.0, 400.0));
    let detached_below_band = popup.show_scroll_affordance();

    popup.jump_to_latest();
    let resumed = !popup.show_scroll_affordance() && popup.apply_pending_scroll();

    let threshold_ok = following_at_band && detached_below_band && resumed;
    println!("following_at_band={following_at_band}");
    println!("detached_below_band={detached_below_band}");
    println!("scroll_follow={threshold_ok}");
    if !threshold_ok {
        return ScenarioFailedSnafu {
            stage: "scenario-scroll-follow-check",
            scenario: "scroll_follow",
            reason: "10 px threshold did not separate following from detached".to_string(),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_error_paths() -> RunnerResult<()> {
    let generic = BackendError::UpstreamStatus {
        stage: "qa-status",
        status: 503,
    }
    .user_message();
    let unauthorized = BackendError::Unauthorized { stage: "qa-status" }.user_message();

    let texts_ok = generic == format!("{GENERIC_ERROR_TEXT} (HTTP 503)")
        && unauthorized == UNAUTHORIZED_ERROR_TEXT;
    println!("generic_text={generic}");
    println!("unauthorized_text={unauthorized}");
    if !texts_ok {
        return ScenarioFailedSnafu {
            stage: "scenario-error-paths-texts",
            scenario: "error_paths",
            reason: "status mapping produced unexpected user-visible text".to_string(),
        }
        .fail();
    }

    let (mut popup, _) =
        anonymous_popup(ScriptedBackend::failing_after(["partial"], generic.clone()));
    popup.set_draft("hi");
    popup.submit().await;
    let trailing_content = popup
        .messages()
        .last()
        .context(ScenarioFailedSnafu {
            stage: "scenario-error-paths-trailing",
            scenario: "error_paths",
            reason: "conversation is empty after failed submit".to_string(),
        })?
        .content
        .clone();

    popup.set_draft("retry");
    let surfaced = trailing_content == generic
        && popup.last_error() == Some(generic.as_str())
        && !popup.is_streaming()
        && !popup.submit_disabled();
    println!("error_paths={surfaced}");
    if !surfaced {
        return ScenarioFailedSnafu {
            stage: "scenario-error-paths-check",
            scenario: "error_paths",
            reason: format!("failure did not settle cleanly, trailing '{trailing_content}'"),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_empty_submit() -> RunnerResult<()> {
    let (mut popup, backend) = anonymous_popup(ScriptedBackend::streaming(["x"]));

    popup.set_draft("   \n  ");
    popup.submit().await;

    let ignored = popup.messages().len() == 1
        && backend.stream_calls() == 0
        && popup.messages()[0].content == MENTOR_GREETING;
    println!("empty_submit={ignored}");
    if !ignored {
        return ScenarioFailedSnafu {
            stage: "scenario-empty-submit-check",
            scenario: "empty_submit",
            reason: format!(
                "whitespace draft reached the backend, {} messages, {} calls",
                popup.messages().len(),
                backend.stream_calls()
            ),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_silent_abort() -> RunnerResult<()> {
    let backend = Arc::new(ScriptedBackend::streaming(["x"]));
    let options = PopupOptions {
        context_mode: ContextMode::ExerciseSession,
        ..PopupOptions::default()
    };
    let mut popup = MentorPopup::new(
        options,
        backend.clone(),
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryVault::with_session("tok")),
    );

    popup.set_draft("hi");
    popup.submit().await;

    let aborted = popup.messages().len() == 1
        && backend.stream_calls() == 0
        && popup.last_error().is_none()
        && popup.draft() == "hi";
    println!("silent_abort={aborted}");
    if !aborted {
        return ScenarioFailedSnafu {
            stage: "scenario-silent-abort-check",
            scenario: "silent_abort",
            reason: "submission without exercise context was not dropped silently".to_string(),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_copy_feedback() -> RunnerResult<()> {
    let reply = ["Try this:\n", "```rust\n", "let x = 1;\n", "```"];
    let (mut popup, _) = anonymous_popup(ScriptedBackend::streaming(reply));
    popup.set_draft("how?");
    popup.submit().await;

    let message_id = popup
        .messages()
        .last()
        .context(ScenarioFailedSnafu {
            stage: "scenario-copy-feedback-trailing",
            scenario: "copy_feedback",
            reason: "conversation is empty after submit".to_string(),
        })?
        .id;
    let document = popup.document_for(message_id).context(ScenarioFailedSnafu {
        stage: "scenario-copy-feedback-document",
        scenario: "copy_feedback",
        reason: "trailing message has no document".to_string(),
    })?;
    let (block_index, _) = document.code_blocks().next().context(ScenarioFailedSnafu {
        stage: "scenario-copy-feedback-block",
        scenario: "copy_feedback",
        reason: "reply contains no code block".to_string(),
    })?;

    let mut clipboard = MemoryClipboard::new();
    let start = Instant::now();
    let copied = popup
        .copy_code_block(&mut clipboard, message_id, block_index, start)
        .map_err(|error| {
            ScenarioFailedSnafu {
                stage: "scenario-copy-feedback-copy",
                scenario: "copy_feedback",
                reason: error.to_string(),
            }
            .build()
        })?;

    let armed = copied
        && clipboard.contents.as_deref() == Some("let x = 1;")
        && popup.copied_block(message_id) == Some(block_index);
    let held = !popup.tick(start + Duration::from_millis(1999))
        && popup.copied_block(message_id) == Some(block_index);
    let reverted = popup.tick(start + Duration::from_millis(2000))
        && popup.copied_block(message_id).is_none();

    let feedback_ok = armed && held && reverted;
    println!("copied_block={block_index}");
    println!("copy_feedback={feedback_ok}");
    if !feedback_ok {
        return ScenarioFailedSnafu {
            stage: "scenario-copy-feedback-check",
            scenario: "copy_feedback",
            reason: format!("armed={armed} held={held} reverted={reverted}"),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

fn run_utf8_split() -> RunnerResult<()> {
    let mut decoder = Utf8StreamDecoder::new();
    let globe = "🌍".as_bytes();

    let mut decoded = String::new();
    decoded.push_str(&decoder.feed(&globe[..2]));
    let held_back = decoded.is_empty();
    decoded.push_str(&decoder.feed(&globe[2..]));
    decoded.push_str(&decoder.feed(b"ab\xFFcd"));
    decoded.push_str(&decoder.finish());

    let decode_ok = held_back && decoded == "🌍ab\u{FFFD}cd";
    println!("decoded={decoded}");
    println!("utf8_split={decode_ok}");
    if !decode_ok {
        return ScenarioFailedSnafu {
            stage: "scenario-utf8-split-check",
            scenario: "utf8_split",
            reason: format!("held_back={held_back} decoded='{decoded}'"),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_identity_probe() -> RunnerResult<()> {
    let identity = mentor_backend::StudentIdentity {
        email: "student@example.com".to_string(),
        first_name: Some("Stu".to_string()),
        last_name: None,
    };
    let known = ScriptedBackend::streaming(["x"]).with_identity(identity);
    let unknown = ScriptedBackend::streaming(["x"]);

    let signed_in =
        MentorPopup::detect_context_mode(&known, &MemoryVault::with_session("tok")).await;
    let signed_out = MentorPopup::detect_context_mode(&known, &MemoryVault::new()).await;
    let unresolved =
        MentorPopup::detect_context_mode(&unknown, &MemoryVault::with_session("tok")).await;

    let probe_ok = signed_in == ContextMode::ExerciseSession
        && signed_out == ContextMode::Anonymous
        && unresolved == ContextMode::Anonymous;
    println!("identity_probe={probe_ok}");
    if !probe_ok {
        return ScenarioFailedSnafu {
            stage: "scenario-identity-probe-check",
            scenario: "identity_probe",
            reason: format!(
                "signed_in={signed_in:?} signed_out={signed_out:?} unresolved={unresolved:?}"
            ),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_all() -> RunnerResult<()> {
    run_stream_accumulation().await?;
    run_trailing_replace()?;
    run_message_cap().await?;
    run_scroll_follow()?;
    run_error_paths().await?;
    run_empty_submit().await?;
    run_silent_abort().await?;
    run_copy_feedback().await?;
    run_utf8_split()?;
    run_identity_probe().await?;

    println!("all_passed=true");
    Ok(())
}
