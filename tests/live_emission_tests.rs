#[cfg(test)]
mod live_emission_tests {
    use std::cell::RefCell;
    use std::collections::{HashMap, HashSet};
    use std::fs;
    use std::rc::Rc;

    use tempfile::TempDir;

    use topogen::config::Config;
    use topogen::emit::{ControllerError, Emitter, LabController, LiveEmitter, NodeRequest, ProgressObserver};
    use topogen::error::EmissionError;
    use topogen::orchestrator;
    use topogen::params::{GenerationParams, Shape};
    use topogen::synth::SynthesizedLab;

    /// In-memory controller that records every call.
    #[derive(Default)]
    struct RecordingController {
        calls: Vec<String>,
        next_id: usize,
        node_labels: HashMap<String, String>,
        fail_node: Option<String>,
        reject_configs: HashSet<String>,
    }

    impl RecordingController {
        fn id(&mut self, prefix: &str) -> String {
            self.next_id += 1;
            format!("{prefix}{}", self.next_id)
        }

        fn position(&self, call: &str) -> usize {
            self.calls
                .iter()
                .position(|c| c == call)
                .unwrap_or_else(|| panic!("no call '{call}'"))
        }
    }

    impl LabController for RecordingController {
        fn create_lab(&mut self, title: &str, _description: &str, _notes: &str) -> Result<String, ControllerError> {
            self.calls.push(format!("lab {title}"));
            Ok(self.id("lab"))
        }

        fn create_node(&mut self, _lab: &str, node: &NodeRequest) -> Result<String, ControllerError> {
            if self.fail_node.as_deref() == Some(node.label.as_str()) {
                return Err(ControllerError::Response {
                    endpoint: "nodes".to_string(),
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            self.calls.push(format!("node {}", node.label));
            let id = self.id("n");
            self.node_labels.insert(id.clone(), node.label.clone());
            Ok(id)
        }

        fn create_interface(&mut self, _lab: &str, node: &str, slot: u32) -> Result<String, ControllerError> {
            self.calls.push(format!("interface {} {slot}", self.node_labels[node]));
            Ok(self.id("i"))
        }

        fn create_link(&mut self, _lab: &str, a: &str, b: &str) -> Result<String, ControllerError> {
            self.calls.push(format!("link {a} {b}"));
            Ok(self.id("l"))
        }

        fn set_configuration(&mut self, _lab: &str, node: &str, configuration: &str) -> Result<(), ControllerError> {
            let label = self.node_labels[node].clone();
            assert!(configuration.contains(&format!("hostname {label}")));
            if self.reject_configs.contains(&label) {
                return Err(ControllerError::Response {
                    endpoint: format!("nodes/{node}"),
                    status: 400,
                    body: "bad config".to_string(),
                });
            }
            self.calls.push(format!("config {label}"));
            Ok(())
        }

        fn export_lab(&mut self, lab: &str) -> Result<String, ControllerError> {
            self.calls.push(format!("export {lab}"));
            Ok("lab:\n  title: exported\n".to_string())
        }
    }

    #[derive(Clone, Default)]
    struct SharedProgress(Rc<RefCell<Vec<(usize, usize)>>>);

    impl ProgressObserver for SharedProgress {
        fn step(&mut self, _step: &str, completed: usize, total: usize) {
            self.0.borrow_mut().push((completed, total));
        }
    }

    fn star_lab(nodes: u32) -> SynthesizedLab {
        orchestrator::generate(&GenerationParams::new(Shape::Star, nodes), &Config::default()).unwrap()
    }

    #[test]
    fn test_replay_order() {
        let lab = star_lab(3);
        let mut emitter = LiveEmitter::new(RecordingController::default());
        let report = emitter.emit(&lab).unwrap();
        let controller = emitter.into_controller();

        assert_eq!(report.target, "lab1");
        assert_eq!(report.nodes, 5);
        assert_eq!(report.links, 4);
        assert_eq!(controller.calls[0], "lab topogen lab");
        // lab, 5 nodes, 8 interfaces, 4 links, 3 configurations
        assert_eq!(controller.calls.len(), 21);

        let sw1 = controller.position("node SW1");
        let r1 = controller.position("node R1");
        let r3_iface = controller.position("interface R3 0");
        let first_link = controller.calls.iter().position(|c| c.starts_with("link")).unwrap();
        let last_link = controller.calls.iter().rposition(|c| c.starts_with("link")).unwrap();
        let first_config = controller.position("config R1");
        assert!(controller.position("node SW0") < sw1);
        assert!(sw1 < r1);
        assert!(r3_iface < first_link);
        assert!(last_link < first_config);
        assert_eq!(controller.calls.last().unwrap(), "config R3");
    }

    #[test]
    fn test_creation_failure_stops_replay() {
        let lab = star_lab(3);
        let controller = RecordingController {
            fail_node: Some("R2".to_string()),
            ..RecordingController::default()
        };
        let mut emitter = LiveEmitter::new(controller);
        match emitter.emit(&lab) {
            Err(EmissionError::Controller { step, completed, .. }) => {
                assert_eq!(step, "create node R2");
                // lab, SW0 + port, SW1 + 4 ports, R1 + slot 0
                assert_eq!(completed, 10);
            }
            other => panic!("expected a controller error, got {other:?}"),
        }
        let controller = emitter.into_controller();
        assert!(!controller.calls.iter().any(|c| c.starts_with("link") || c.starts_with("config")));
        assert!(!controller.calls.iter().any(|c| c == "node R3"));
    }

    #[test]
    fn test_configuration_failures_collected() {
        let lab = star_lab(3);
        let controller = RecordingController {
            reject_configs: ["R1".to_string(), "R3".to_string()].into_iter().collect(),
            ..RecordingController::default()
        };
        let mut emitter = LiveEmitter::new(controller);
        match emitter.emit(&lab) {
            Err(EmissionError::Configuration { failures }) => {
                let labels: Vec<&str> = failures.iter().map(|(label, _)| label.as_str()).collect();
                assert_eq!(labels, vec!["R1", "R3"]);
            }
            other => panic!("expected configuration failures, got {other:?}"),
        }
        let controller = emitter.into_controller();
        assert!(controller.calls.contains(&"config R2".to_string()));
    }

    #[test]
    fn test_export_refused_before_any_call() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("export.yaml");
        fs::write(&path, "old").unwrap();

        let lab = star_lab(2);
        let mut emitter = LiveEmitter::new(RecordingController::default()).with_export(&path, false);
        assert!(matches!(emitter.emit(&lab), Err(EmissionError::TargetExists { .. })));
        assert!(emitter.into_controller().calls.is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), "old");
    }

    #[test]
    fn test_export_written_and_progress_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("export.yaml");
        let progress = SharedProgress::default();

        let lab = star_lab(2);
        let mut emitter = LiveEmitter::new(RecordingController::default())
            .with_export(&path, false)
            .with_observer(Box::new(progress.clone()));
        let report = emitter.emit(&lab).unwrap();

        assert_eq!(report.exported.as_deref(), Some(path.as_path()));
        assert!(fs::read_to_string(&path).unwrap().contains("exported"));
        assert_eq!(emitter.into_controller().calls.last().unwrap(), "export lab1");

        let steps = progress.0.borrow();
        let (completed, total) = *steps.last().unwrap();
        assert_eq!(completed, total);
        assert_eq!(steps.len(), total);
    }
}
