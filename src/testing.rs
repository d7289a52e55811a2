//! Test doubles shared by unit tests.

use anyhow::{Result, anyhow};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::input::{ClickOptions, InputDevice, Key, KeyBindings};
use crate::vision::{DetectionBox, Frame, Perception, Region, TextBox};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputEvent {
    Down(Key),
    Up(Key),
    Click(i32, i32),
}

/// Records input and checks that opposing movement keys never overlap.
pub struct RecordingInput {
    events: Mutex<Vec<InputEvent>>,
    held: Mutex<HashSet<Key>>,
    opposing: Vec<(Key, Key)>,
    violations: AtomicUsize,
}

impl RecordingInput {
    pub fn new() -> Self {
        let keys = KeyBindings::default();
        Self {
            events: Mutex::new(Vec::new()),
            held: Mutex::new(HashSet::new()),
            opposing: vec![(keys.forward, keys.back), (keys.left, keys.right)],
            violations: AtomicUsize::new(0),
        }
    }

    pub fn events(&self) -> Vec<InputEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn held_keys(&self) -> HashSet<Key> {
        self.held.lock().unwrap().clone()
    }

    pub fn is_held(&self, key: Key) -> bool {
        self.held.lock().unwrap().contains(&key)
    }

    pub fn clicks(&self) -> Vec<(i32, i32)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                InputEvent::Click(x, y) => Some((x, y)),
                _ => None,
            })
            .collect()
    }

    pub fn presses(&self, key: Key) -> usize {
        self.events()
            .iter()
            .filter(|e| **e == InputEvent::Down(key))
            .count()
    }

    pub fn opposing_violations(&self) -> usize {
        self.violations.load(Ordering::SeqCst)
    }
}

impl InputDevice for RecordingInput {
    fn key_down(&self, key: Key) -> Result<()> {
        let mut held = self.held.lock().unwrap();
        for (a, b) in &self.opposing {
            if (key == *a && held.contains(b)) || (key == *b && held.contains(a)) {
                self.violations.fetch_add(1, Ordering::SeqCst);
            }
        }
        held.insert(key);
        self.events.lock().unwrap().push(InputEvent::Down(key));
        Ok(())
    }

    fn key_up(&self, key: Key) -> Result<()> {
        if self.held.lock().unwrap().remove(&key) {
            self.events.lock().unwrap().push(InputEvent::Up(key));
        }
        Ok(())
    }

    fn click(&self, x: i32, y: i32, _opts: ClickOptions) -> Result<()> {
        self.events.lock().unwrap().push(InputEvent::Click(x, y));
        Ok(())
    }

    fn release_all(&self) -> Result<()> {
        let keys: Vec<Key> = self.held.lock().unwrap().drain().collect();
        let mut events = self.events.lock().unwrap();
        events.extend(keys.into_iter().map(InputEvent::Up));
        Ok(())
    }
}

/// Input device whose every call fails.
pub struct FailingInput;

impl InputDevice for FailingInput {
    fn key_down(&self, _key: Key) -> Result<()> {
        Err(anyhow!("device unplugged"))
    }

    fn key_up(&self, _key: Key) -> Result<()> {
        Ok(())
    }

    fn click(&self, _x: i32, _y: i32, _opts: ClickOptions) -> Result<()> {
        Err(anyhow!("device unplugged"))
    }

    fn release_all(&self) -> Result<()> {
        Ok(())
    }
}

/// Perception with scripted results.
///
/// Per label, scripted result sets are consumed one per query; once a
/// label's script runs out its fixed result (if any) is returned.
#[derive(Default)]
pub struct StubPerception {
    frame: Mutex<Option<Arc<Frame>>>,
    scripted: Mutex<HashMap<String, VecDeque<Vec<DetectionBox>>>>,
    fixed: Mutex<HashMap<String, Vec<DetectionBox>>>,
    texts: Mutex<VecDeque<Vec<TextBox>>>,
    fixed_text: Mutex<Vec<TextBox>>,
    queries: Mutex<Vec<Vec<String>>>,
    detect_calls: AtomicUsize,
}

impl StubPerception {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frame(frame: Frame) -> Self {
        let stub = Self::new();
        stub.set_frame(frame);
        stub
    }

    pub fn set_frame(&self, frame: Frame) {
        *self.frame.lock().unwrap() = Some(Arc::new(frame));
    }

    pub fn set_detections(&self, label: &str, boxes: Vec<DetectionBox>) {
        self.fixed.lock().unwrap().insert(label.to_string(), boxes);
    }

    pub fn clear_detections(&self, label: &str) {
        self.fixed.lock().unwrap().remove(label);
    }

    pub fn script_detections(&self, label: &str, script: Vec<Vec<DetectionBox>>) {
        self.scripted
            .lock()
            .unwrap()
            .entry(label.to_string())
            .or_default()
            .extend(script);
    }

    pub fn script_text(&self, script: Vec<Vec<TextBox>>) {
        self.texts.lock().unwrap().extend(script);
    }

    pub fn set_text(&self, text: &str) {
        *self.fixed_text.lock().unwrap() = vec![TextBox {
            bounds: Region::new(0, 0, 10, 10),
            confidence: 0.9,
            text: text.to_string(),
        }];
    }

    pub fn detect_calls(&self) -> usize {
        self.detect_calls.load(Ordering::SeqCst)
    }

    pub fn queried_labels(&self) -> Vec<Vec<String>> {
        self.queries.lock().unwrap().clone()
    }

    pub fn was_queried(&self, label: &str) -> bool {
        self.queries
            .lock()
            .unwrap()
            .iter()
            .any(|q| q.iter().any(|l| l == label))
    }
}

impl Perception for StubPerception {
    fn current_frame(&self) -> Result<Option<Arc<Frame>>> {
        Ok(self.frame.lock().unwrap().clone())
    }

    fn detect(
        &self,
        labels: &[&str],
        _region: Option<Region>,
        threshold: f32,
    ) -> Result<Vec<DetectionBox>> {
        self.detect_calls.fetch_add(1, Ordering::SeqCst);
        self.queries
            .lock()
            .unwrap()
            .push(labels.iter().map(|l| l.to_string()).collect());

        let mut boxes = Vec::new();
        for label in labels {
            let scripted = self
                .scripted
                .lock()
                .unwrap()
                .get_mut(*label)
                .and_then(VecDeque::pop_front);
            match scripted {
                Some(set) => boxes.extend(set),
                None => {
                    if let Some(set) = self.fixed.lock().unwrap().get(*label) {
                        boxes.extend(set.iter().cloned());
                    }
                }
            }
        }
        boxes.retain(|b| b.confidence >= threshold);
        crate::vision::gateway::rank(&mut boxes);
        Ok(boxes)
    }

    fn read_text(&self, _region: Region) -> Result<Vec<TextBox>> {
        if let Some(next) = self.texts.lock().unwrap().pop_front() {
            return Ok(next);
        }
        Ok(self.fixed_text.lock().unwrap().clone())
    }
}
