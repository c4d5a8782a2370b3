use std::future::Future;

use tokio::sync::mpsc::{
    self, error::TrySendError, Receiver, Sender, UnboundedReceiver, UnboundedSender,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use tracing::{debug, info, warn};

use crate::config::WorkflowSettings;
use crate::error::{AppError, ServiceError};
use crate::services::{
    CaptureRequest, CaptureService, IdentificationService, ServiceRequest, ServiceResponse,
};
use crate::workflow::{
    Command, Completion, CompletionResult, FollowupAnswer, IdentificationOutcome, Intent,
    RequestToken, WorkflowController, WorkflowSnapshot,
};

/// Cloneable front door to a running [`AppController`].
#[derive(Clone)]
pub struct ControllerHandle {
    intent_tx: Sender<Intent>,
    snapshot_rx: watch::Receiver<WorkflowSnapshot>,
}

impl ControllerHandle {
    pub async fn submit(&self, intent: Intent) -> Result<(), AppError> {
        self.intent_tx
            .send(intent)
            .await
            .map_err(|_| AppError::RuntimeStopped)
    }

    /// Non-blocking submit for the UI thread.
    pub fn try_submit(&self, intent: Intent) -> Result<(), AppError> {
        match self.intent_tx.try_send(intent) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(intent)) => Err(AppError::Ui(format!(
                "Too many pending actions, dropped {}",
                intent.name()
            ))),
            Err(TrySendError::Closed(_)) => Err(AppError::RuntimeStopped),
        }
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkflowSnapshot> {
        self.snapshot_rx.clone()
    }
}

/// Owns the workflow controller and runs its commands against the camera and
/// the identification service. Intents and completions are handled one at a time.
pub struct AppController {
    controller: WorkflowController,
    capture: CaptureService,
    identification: IdentificationService,
    intent_rx: Receiver<Intent>,
    completion_tx: UnboundedSender<Completion>,
    completion_rx: UnboundedReceiver<Completion>,
    snapshot_tx: watch::Sender<WorkflowSnapshot>,
    task: Option<(RequestToken, JoinHandle<()>)>,
}

impl AppController {
    pub fn new(
        settings: &WorkflowSettings,
        capture: CaptureService,
        identification: IdentificationService,
    ) -> (Self, ControllerHandle) {
        let controller = WorkflowController::new(settings.abort_in_flight);
        let (intent_tx, intent_rx) = mpsc::channel(settings.intent_buffer);
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(controller.snapshot());
        (
            Self {
                controller,
                capture,
                identification,
                intent_rx,
                completion_tx,
                completion_rx,
                snapshot_tx,
                task: None,
            },
            ControllerHandle {
                intent_tx,
                snapshot_rx,
            },
        )
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs until every [`ControllerHandle`] has been dropped.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                intent = self.intent_rx.recv() => {
                    let Some(intent) = intent else {
                        info!("All controller handles dropped, stopping workflow");
                        break;
                    };
                    if let Some(command) = self.controller.handle_intent(intent) {
                        self.execute(command);
                    }
                }
                Some(completion) = self.completion_rx.recv() => {
                    if matches!(&self.task, Some((token, _)) if *token == completion.token) {
                        self.task = None;
                    }
                    self.controller.handle_completion(completion);
                }
            }
            self.snapshot_tx.send_replace(self.controller.snapshot());
        }

        if let Some((token, handle)) = self.task.take() {
            debug!("Aborting {} on shutdown", token);
            handle.abort();
        }
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::Cancel { token } => match self.task.take() {
                Some((running, handle)) if running == token => {
                    debug!("Cancelling {}", token);
                    handle.abort();
                }
                other => self.task = other,
            },
            Command::Capture { token } => {
                let capture = self.capture.clone();
                self.spawn_operation(token, async move {
                    CompletionResult::Captured(capture.oneshot(CaptureRequest).await)
                });
            }
            Command::Identify { token, image } => {
                let service = self.identification.clone();
                self.spawn_operation(token, async move {
                    let response = service.oneshot(ServiceRequest::Identify(image)).await;
                    CompletionResult::Identified(into_outcome(response))
                });
            }
            Command::Lookup { token, code } => {
                let service = self.identification.clone();
                self.spawn_operation(token, async move {
                    let response = service.oneshot(ServiceRequest::Lookup(code)).await;
                    CompletionResult::Identified(into_outcome(response))
                });
            }
            Command::Ask {
                token,
                subject,
                question,
            } => {
                let service = self.identification.clone();
                self.spawn_operation(token, async move {
                    let response = service
                        .oneshot(ServiceRequest::Ask { subject, question })
                        .await;
                    CompletionResult::Answered(into_answer(response))
                });
            }
        }
    }

    fn spawn_operation<F>(&mut self, token: RequestToken, operation: F)
    where
        F: Future<Output = CompletionResult> + Send + 'static,
    {
        let completion_tx = self.completion_tx.clone();
        let handle = tokio::spawn(async move {
            let result = operation.await;
            if completion_tx.send(Completion::new(token, result)).is_err() {
                debug!("Workflow stopped before {} completed", token);
            }
        });
        if let Some((previous, _)) = self.task.replace((token, handle)) {
            warn!("{} issued while {} was still tracked", token, previous);
        }
    }
}

fn into_outcome(
    response: Result<ServiceResponse, ServiceError>,
) -> Result<IdentificationOutcome, ServiceError> {
    match response? {
        ServiceResponse::Outcome(outcome) => Ok(outcome),
        ServiceResponse::Answer(_) => Err(ServiceError::Protocol(
            "expected an identification outcome, got an answer".to_string(),
        )),
    }
}

fn into_answer(
    response: Result<ServiceResponse, ServiceError>,
) -> Result<FollowupAnswer, ServiceError> {
    match response? {
        ServiceResponse::Answer(answer) => Ok(answer),
        ServiceResponse::Outcome(_) => Err(ServiceError::Protocol(
            "expected an answer, got an identification outcome".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::oneshot;
    use tower::util::BoxCloneService;
    use tower::{service_fn, ServiceBuilder};

    use super::*;
    use crate::error::{CaptureError, CONNECTIVITY_MESSAGE};
    use crate::workflow::{
        CapturedImage, MedicationRecord, MedicationSuggestion, StateKind, WorkflowState,
    };

    type Responder = oneshot::Sender<Result<ServiceResponse, ServiceError>>;
    type Requests = UnboundedReceiver<(ServiceRequest, Responder)>;

    fn camera(result: Result<CapturedImage, CaptureError>) -> CaptureService {
        BoxCloneService::new(service_fn(move |_: CaptureRequest| {
            let result = result.clone();
            async move { result }
        }))
    }

    fn photo() -> CapturedImage {
        CapturedImage::new(vec![0xff, 0xd8, 0xff, 0xd9], 2, 2)
    }

    /// Every call is handed to the test, which decides when and how it resolves.
    fn scripted_service() -> (IdentificationService, Requests) {
        let (tx, rx) = mpsc::unbounded_channel();
        let service = service_fn(move |request: ServiceRequest| {
            let tx = tx.clone();
            async move {
                let (responder, response) = oneshot::channel();
                tx.send((request, responder))
                    .map_err(|_| ServiceError::Unreachable("test finished".to_string()))?;
                response
                    .await
                    .map_err(|_| ServiceError::Unreachable("responder dropped".to_string()))?
            }
        });
        (BoxCloneService::new(service), rx)
    }

    fn record(name: &str, code: &str) -> MedicationRecord {
        MedicationRecord {
            name: name.to_string(),
            description: "20 tablets".to_string(),
            manufacturer: None,
            code: Some(code.to_string()),
            leaflet: None,
        }
    }

    fn start(
        abort_in_flight: bool,
        capture: CaptureService,
        identification: IdentificationService,
    ) -> (ControllerHandle, JoinHandle<()>) {
        let settings = WorkflowSettings {
            abort_in_flight,
            intent_buffer: 8,
        };
        let (controller, handle) = AppController::new(&settings, capture, identification);
        (handle, controller.spawn())
    }

    async fn wait_for(handle: &ControllerHandle, kind: StateKind) -> WorkflowSnapshot {
        let mut rx = handle.subscribe();
        let snapshot = tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(|snapshot| snapshot.state.kind() == kind),
        )
        .await
        .expect("timed out waiting for state")
        .expect("controller stopped")
        .clone();
        snapshot
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    async fn captured(handle: &ControllerHandle) {
        handle.submit(Intent::Capture).await.unwrap();
        wait_for(handle, StateKind::Captured).await;
    }

    #[tokio::test]
    async fn capture_identify_and_reset() {
        let (service, mut requests) = scripted_service();
        let (handle, _task) = start(true, camera(Ok(photo())), service);

        captured(&handle).await;
        handle.submit(Intent::Analyze).await.unwrap();
        let (request, responder) = requests.recv().await.unwrap();
        assert!(matches!(request, ServiceRequest::Identify(_)));

        let expected = record("Paracetamol", "712729");
        responder
            .send(Ok(ServiceResponse::Outcome(IdentificationOutcome::Identified {
                subject: expected.clone(),
            })))
            .unwrap();
        let snapshot = wait_for(&handle, StateKind::Result).await;
        assert_eq!(snapshot.state.record(), Some(&expected));

        handle.submit(Intent::Reset).await.unwrap();
        let snapshot = wait_for(&handle, StateKind::Idle).await;
        assert!(snapshot.state.image().is_none());
        assert!(snapshot.state.record().is_none());
    }

    #[tokio::test]
    async fn second_analyze_issues_no_request() {
        let (service, mut requests) = scripted_service();
        let (handle, _task) = start(true, camera(Ok(photo())), service);

        captured(&handle).await;
        handle.submit(Intent::Analyze).await.unwrap();
        handle.submit(Intent::Analyze).await.unwrap();
        let (_, responder) = requests.recv().await.unwrap();
        settle().await;
        assert!(requests.try_recv().is_err());

        responder
            .send(Ok(ServiceResponse::Outcome(IdentificationOutcome::NotFound {
                message: "Medicamento no encontrado".to_string(),
            })))
            .unwrap();
        let snapshot = wait_for(&handle, StateKind::Failed).await;
        assert_eq!(
            snapshot.state,
            WorkflowState::Failed {
                message: "Medicamento no encontrado".to_string()
            }
        );
        assert!(requests.try_recv().is_err());
    }

    #[tokio::test]
    async fn reset_makes_the_pending_completion_stale() {
        let (service, mut requests) = scripted_service();
        let (handle, _task) = start(true, camera(Ok(photo())), service);

        captured(&handle).await;
        handle.submit(Intent::Analyze).await.unwrap();
        let (_, responder) = requests.recv().await.unwrap();
        handle.submit(Intent::Reset).await.unwrap();
        wait_for(&handle, StateKind::Idle).await;

        let _ = responder.send(Ok(ServiceResponse::Outcome(
            IdentificationOutcome::Identified {
                subject: record("Paracetamol", "712729"),
            },
        )));
        settle().await;
        assert_eq!(handle.snapshot().state, WorkflowState::Idle);
    }

    #[tokio::test]
    async fn deferred_reset_discards_the_result_on_arrival() {
        let (service, mut requests) = scripted_service();
        let (handle, _task) = start(false, camera(Ok(photo())), service);

        captured(&handle).await;
        handle.submit(Intent::Analyze).await.unwrap();
        let (_, responder) = requests.recv().await.unwrap();
        handle.submit(Intent::Reset).await.unwrap();
        settle().await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.state.kind(), StateKind::Analyzing);
        assert!(snapshot.reset_pending);

        responder
            .send(Ok(ServiceResponse::Outcome(IdentificationOutcome::Identified {
                subject: record("Paracetamol", "712729"),
            })))
            .unwrap();
        let snapshot = wait_for(&handle, StateKind::Idle).await;
        assert!(!snapshot.reset_pending);
    }

    #[tokio::test]
    async fn selected_suggestion_is_looked_up() {
        let (service, mut requests) = scripted_service();
        let (handle, _task) = start(true, camera(Ok(photo())), service);

        captured(&handle).await;
        handle.submit(Intent::Analyze).await.unwrap();
        let (_, responder) = requests.recv().await.unwrap();
        responder
            .send(Ok(ServiceResponse::Outcome(IdentificationOutcome::Ambiguous {
                suggestions: vec![
                    MedicationSuggestion {
                        code: "A".to_string(),
                        name: "Ibuprofeno 400".to_string(),
                    },
                    MedicationSuggestion {
                        code: "B".to_string(),
                        name: "Ibuprofeno 600".to_string(),
                    },
                ],
            })))
            .unwrap();
        wait_for(&handle, StateKind::Suggestions).await;

        handle
            .submit(Intent::SelectSuggestion("B".to_string()))
            .await
            .unwrap();
        let (request, responder) = requests.recv().await.unwrap();
        assert!(matches!(request, ServiceRequest::Lookup(ref code) if code == "B"));

        let expected = record("Ibuprofeno 600", "B");
        responder
            .send(Ok(ServiceResponse::Outcome(IdentificationOutcome::Identified {
                subject: expected.clone(),
            })))
            .unwrap();
        let snapshot = wait_for(&handle, StateKind::Result).await;
        assert_eq!(snapshot.state.record(), Some(&expected));
    }

    #[tokio::test]
    async fn ask_failure_is_shown_inline() {
        let (service, mut requests) = scripted_service();
        let (handle, _task) = start(true, camera(Ok(photo())), service);
        let held = record("Paracetamol", "712729");

        captured(&handle).await;
        handle.submit(Intent::Analyze).await.unwrap();
        let (_, responder) = requests.recv().await.unwrap();
        responder
            .send(Ok(ServiceResponse::Outcome(IdentificationOutcome::Identified {
                subject: held.clone(),
            })))
            .unwrap();
        wait_for(&handle, StateKind::Result).await;

        handle.submit(Intent::OpenQuestions).await.unwrap();
        handle.submit(Intent::AskQuestion("".to_string())).await.unwrap();
        handle
            .submit(Intent::AskQuestion("Can children take it?".to_string()))
            .await
            .unwrap();
        let (request, responder) = requests.recv().await.unwrap();
        match request {
            ServiceRequest::Ask { subject, question } => {
                assert_eq!(subject, "712729");
                assert_eq!(question, "Can children take it?");
            }
            other => panic!("expected ask, got {:?}", other),
        }
        responder.send(Err(ServiceError::Timeout)).unwrap();

        let mut rx = handle.subscribe();
        let snapshot = tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(|s| {
                matches!(&s.state, WorkflowState::QuestionMode { error: Some(_), .. })
            }),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        match snapshot.state {
            WorkflowState::QuestionMode { record, error, .. } => {
                assert_eq!(record, held);
                assert_eq!(error.as_deref(), Some(CONNECTIVITY_MESSAGE));
            }
            other => panic!("expected question mode, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn camera_failure_returns_to_idle_with_notice() {
        let (service, _requests) = scripted_service();
        let (handle, _task) = start(
            true,
            camera(Err(CaptureError::Device("permission denied".to_string()))),
            service,
        );

        handle.submit(Intent::Capture).await.unwrap();
        let mut rx = handle.subscribe();
        let snapshot = tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(|s| s.notice.is_some()),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert_eq!(snapshot.state, WorkflowState::Idle);
        assert_eq!(
            snapshot.notice.as_deref(),
            Some("Camera unavailable: permission denied")
        );
    }

    #[tokio::test]
    async fn identification_timeout_is_a_transport_failure() {
        let slow = ServiceBuilder::new()
            .map_err(ServiceError::from_boxed)
            .timeout(Duration::from_millis(50))
            .service(service_fn(|_: ServiceRequest| async {
                futures::future::pending::<Result<ServiceResponse, ServiceError>>().await
            }));
        let (handle, _task) = start(true, camera(Ok(photo())), BoxCloneService::new(slow));

        captured(&handle).await;
        handle.submit(Intent::Analyze).await.unwrap();
        let snapshot = wait_for(&handle, StateKind::Failed).await;
        assert_eq!(
            snapshot.state,
            WorkflowState::Failed {
                message: CONNECTIVITY_MESSAGE.to_string()
            }
        );
    }

    #[tokio::test]
    async fn stops_when_every_handle_is_dropped() {
        let (service, _requests) = scripted_service();
        let (handle, task) = start(true, camera(Ok(photo())), service);
        drop(handle);
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("controller did not stop")
            .unwrap();
    }
}
