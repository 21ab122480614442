//! Scriptable in-memory collaborators shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::media::{CameraConstraints, CameraDevice, CameraStream, DeviceError, RawFrame};
use crate::reporting::{ErrorReport, ErrorReporter};
use crate::services::{
    AuthSession, BlobStore, ContactResponse, ContactSubmitter, ManualRecordRequest,
    ManualRecordResponse, RecognitionRequest, RecognitionResponse, RecognitionService,
    SessionProvider, WeighInRecorder,
};
use crate::transfer::TransportError;

const FRAME_WIDTH: u32 = 64;
const FRAME_HEIGHT: u32 = 48;

pub fn recognized(weight_value: f64, day_number: u8, is_new_day: bool) -> RecognitionResponse {
    RecognitionResponse {
        success: true,
        weight_value: Some(weight_value),
        day_number: Some(day_number),
        is_new_day,
        badge_earned: is_new_day.then(|| format!("day-{day_number}")),
        error_message: None,
    }
}

fn no_script() -> TransportError {
    TransportError::status(500, "no scripted response")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamScript {
    /// Frames flow as soon as the stream opens.
    Immediate,
    ReadyAfter(Duration),
    /// Never signals readiness, but produces frames once playback is forced.
    StartsOnKick,
    NeverReady,
}

struct CameraCounters {
    failure: Mutex<Option<DeviceError>>,
    script: StreamScript,
    hang_on_open: AtomicBool,
    open: AtomicUsize,
    opened_total: AtomicUsize,
    stops: AtomicUsize,
    kicks: AtomicUsize,
}

#[derive(Clone)]
pub struct FakeCamera {
    inner: Arc<CameraCounters>,
}

impl FakeCamera {
    pub fn with_script(script: StreamScript) -> Self {
        Self {
            inner: Arc::new(CameraCounters {
                failure: Mutex::new(None),
                script,
                hang_on_open: AtomicBool::new(false),
                open: AtomicUsize::new(0),
                opened_total: AtomicUsize::new(0),
                stops: AtomicUsize::new(0),
                kicks: AtomicUsize::new(0),
            }),
        }
    }

    pub fn working() -> Self {
        Self::with_script(StreamScript::Immediate)
    }

    pub fn failing(name: &str, message: &str) -> Self {
        let camera = Self::working();
        camera.set_failure(Some(DeviceError::new(name, message)));
        camera
    }

    /// Change what the next `open` returns, e.g. after the user grants permission.
    pub fn set_failure(&self, failure: Option<DeviceError>) {
        *self.inner.failure.lock().unwrap() = failure;
    }

    /// Make `open` never resolve, like a platform prompt nobody answers.
    pub fn hang_on_open(&self, hang: bool) {
        self.inner.hang_on_open.store(hang, Ordering::SeqCst);
    }

    pub fn open_streams(&self) -> usize {
        self.inner.open.load(Ordering::SeqCst)
    }

    pub fn opened_total(&self) -> usize {
        self.inner.opened_total.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.inner.stops.load(Ordering::SeqCst)
    }

    pub fn kick_calls(&self) -> usize {
        self.inner.kicks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CameraDevice for FakeCamera {
    async fn open(
        &self,
        _constraints: &CameraConstraints,
    ) -> Result<Box<dyn CameraStream>, DeviceError> {
        if self.inner.hang_on_open.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if let Some(err) = self.inner.failure.lock().unwrap().clone() {
            return Err(err);
        }
        self.inner.open.fetch_add(1, Ordering::SeqCst);
        self.inner.opened_total.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            counters: self.inner.clone(),
            opened_at: Instant::now(),
            kicked: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }))
    }
}

struct FakeStream {
    counters: Arc<CameraCounters>,
    opened_at: Instant,
    kicked: AtomicBool,
    stopped: AtomicBool,
}

impl FakeStream {
    fn flowing(&self) -> bool {
        if self.stopped.load(Ordering::SeqCst) {
            return false;
        }
        match self.counters.script {
            StreamScript::Immediate => true,
            StreamScript::ReadyAfter(delay) => Instant::now() >= self.opened_at + delay,
            StreamScript::StartsOnKick => self.kicked.load(Ordering::SeqCst),
            StreamScript::NeverReady => false,
        }
    }
}

#[async_trait]
impl CameraStream for FakeStream {
    fn dimensions(&self) -> (u32, u32) {
        if self.flowing() {
            (FRAME_WIDTH, FRAME_HEIGHT)
        } else {
            (0, 0)
        }
    }

    async fn ready(&self) {
        match self.counters.script {
            StreamScript::Immediate => {}
            StreamScript::ReadyAfter(delay) => {
                tokio::time::sleep_until(self.opened_at + delay).await
            }
            StreamScript::StartsOnKick | StreamScript::NeverReady => {
                std::future::pending::<()>().await
            }
        }
    }

    fn kick_playback(&self) {
        self.counters.kicks.fetch_add(1, Ordering::SeqCst);
        self.kicked.store(true, Ordering::SeqCst);
    }

    fn grab_frame(&self) -> Result<RawFrame, DeviceError> {
        if !self.flowing() {
            return Err(DeviceError::new("InvalidStateError", "no frame available"));
        }
        let mut rgba = Vec::with_capacity((FRAME_WIDTH * FRAME_HEIGHT * 4) as usize);
        for y in 0..FRAME_HEIGHT {
            for x in 0..FRAME_WIDTH {
                rgba.extend_from_slice(&[(x * 4) as u8, (y * 5) as u8, 128, 255]);
            }
        }
        Ok(RawFrame {
            width: FRAME_WIDTH,
            height: FRAME_HEIGHT,
            rgba,
        })
    }

    fn stop_tracks(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.counters.open.fetch_sub(1, Ordering::SeqCst);
            self.counters.stops.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[derive(Default)]
pub struct FakeBlobStore {
    uploads: Mutex<Vec<String>>,
    failures: Mutex<VecDeque<TransportError>>,
    hang: AtomicBool,
}

impl FakeBlobStore {
    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn hang_forever(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    pub fn fail_next(&self, err: TransportError) {
        self.failures.lock().unwrap().push_back(err);
    }
}

#[async_trait]
impl BlobStore for FakeBlobStore {
    async fn upload(
        &self,
        path: &str,
        _bytes: &[u8],
        _content_type: &str,
    ) -> Result<String, TransportError> {
        self.uploads.lock().unwrap().push(path.to_string());
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(format!("stored/{path}"))
    }
}

#[derive(Default)]
pub struct FakeRecognizer {
    responses: Mutex<VecDeque<Result<RecognitionResponse, TransportError>>>,
    requests: Mutex<Vec<RecognitionRequest>>,
    delay: Mutex<Option<Duration>>,
}

impl FakeRecognizer {
    pub fn push(&self, response: Result<RecognitionResponse, TransportError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn requests(&self) -> Vec<RecognitionRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Hold every response for `delay` before answering.
    pub fn delay_responses(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl RecognitionService for FakeRecognizer {
    async fn recognize(
        &self,
        request: &RecognitionRequest,
    ) -> Result<RecognitionResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(no_script()))
    }
}

#[derive(Default)]
pub struct FakeRecorder {
    responses: Mutex<VecDeque<Result<ManualRecordResponse, TransportError>>>,
    requests: Mutex<Vec<ManualRecordRequest>>,
}

impl FakeRecorder {
    pub fn push(&self, response: Result<ManualRecordResponse, TransportError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn requests(&self) -> Vec<ManualRecordRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl WeighInRecorder for FakeRecorder {
    async fn record_manual(
        &self,
        request: &ManualRecordRequest,
    ) -> Result<ManualRecordResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(no_script()))
    }
}

#[derive(Default)]
pub struct FakeContactSubmitter {
    responses: Mutex<VecDeque<Result<ContactResponse, TransportError>>>,
    numbers: Mutex<Vec<String>>,
}

impl FakeContactSubmitter {
    pub fn push(&self, response: Result<ContactResponse, TransportError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn numbers(&self) -> Vec<String> {
        self.numbers.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContactSubmitter for FakeContactSubmitter {
    async fn submit_phone(&self, phone_number: &str) -> Result<ContactResponse, TransportError> {
        self.numbers.lock().unwrap().push(phone_number.to_string());
        let next = self.responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(no_script()))
    }
}

pub struct FakeSessionProvider {
    session: Mutex<Option<AuthSession>>,
}

impl FakeSessionProvider {
    pub fn signed_in(user_id: &str) -> Self {
        Self {
            session: Mutex::new(Some(AuthSession {
                user_id: user_id.to_string(),
                access_token: format!("token-{user_id}"),
            })),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            session: Mutex::new(None),
        }
    }
}

#[async_trait]
impl SessionProvider for FakeSessionProvider {
    async fn current_session(&self) -> Option<AuthSession> {
        self.session.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<ErrorReport>>,
}

impl RecordingReporter {
    pub fn reports(&self) -> Vec<ErrorReport> {
        self.reports.lock().unwrap().clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, report: ErrorReport) {
        self.reports.lock().unwrap().push(report);
    }
}
