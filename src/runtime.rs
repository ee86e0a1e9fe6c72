// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{
    clock::{self, ClockHandle},
    config::{self, ConfigError},
    controller::{self, input::Listener, ControllerHandle, GridController, Model},
    events::EventBus,
    morph,
    output,
    project::Project,
    store::Store,
    trigger,
};

/// Owns every long-lived component of a running session.
pub struct Runtime {
    bus: EventBus,
    store: Arc<Store>,
    controller: ControllerHandle,
    listener: Mutex<Option<Listener>>,
    clock: ClockHandle,
    trigger: Arc<trigger::Engine>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    clock_task: JoinHandle<()>,
}

impl Runtime {
    /// Builds the components from the configuration and starts their tasks.
    /// Missing hardware is not an error: the generic controller stands in for
    /// the grid and CC values are dropped without an output.
    pub fn start(config: &config::Snapblaster, project: Project) -> Result<Runtime, ConfigError> {
        let license = config.license();
        let settings = config.morph_settings()?;
        let clock_config = config.clock();
        let beats_per_bar = clock_config.beats_per_bar()?;
        let controller_config = config.controller();
        let model = controller_config.model()?;
        let output_config = config.output();
        let channel = output_config.channel()?;

        let bus = EventBus::new(config.bus_capacity()?);
        let store = Arc::new(Store::new(project, license, bus.clone()));
        info!(
            license = license.to_string(),
            project = store.snapshot().to_string(),
            "Starting snapblaster."
        );

        let controller = ControllerHandle::new(controller::create(
            model,
            controller_config.port(),
            bus.clone(),
        ));

        let mut tasks = Vec::new();
        let trigger = Arc::new(trigger::Engine::new(
            store.clone(),
            controller.clone(),
            settings.clone(),
        ));
        tasks.push(("trigger engine", trigger.clone().start()));
        tasks.push((
            "morph engine",
            morph::Engine::new(store.clone(), license, settings).start(),
        ));
        if let Some(output) = output::open(output_config.port(), channel, store.clone()) {
            tasks.push(("cc output", output.start()));
        }

        let (clock, clock_task) = clock::start(
            bus.clone(),
            clock_config.bpm(),
            beats_per_bar,
            clock_config.enabled(),
        );
        let listener = Listener::start(controller.clone());

        Ok(Runtime {
            bus,
            store,
            controller,
            listener: Mutex::new(listener),
            clock,
            trigger,
            tasks,
            clock_task,
        })
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn clock(&self) -> &ClockHandle {
        &self.clock
    }

    pub fn trigger(&self) -> &Arc<trigger::Engine> {
        &self.trigger
    }

    /// The currently bound controller.
    pub fn controller(&self) -> Arc<dyn GridController> {
        self.controller.get()
    }

    /// Swaps the grid controller without restarting anything else. The new
    /// controller is drawn from the current session.
    pub fn rebind_controller(&self, model: Model, port: Option<&str>) {
        let next = controller::create(model, port, self.bus.clone());

        let mut listener = self.listener.lock();
        if let Some(listener) = listener.take() {
            listener.stop();
        }
        let previous = self.controller.rebind(next);
        previous.shutdown();
        *listener = Listener::start(self.controller.clone());

        let current = self.controller.get();
        current.invalidate();
        if let Err(e) = current.refresh_state(&self.store.session()) {
            warn!(
                controller = current.name(),
                err = e.to_string(),
                "Unable to draw session on the new controller."
            );
        }
    }

    /// Stops every task. Pending events are still delivered before the tasks exit.
    pub fn shutdown(&self) {
        info!("Shutting down.");
        if let Some(listener) = self.listener.lock().take() {
            listener.stop();
        }
        let controller = self.controller.get();
        if let Err(e) = controller.clear_leds() {
            warn!(err = e.to_string(), "Unable to clear LEDs.");
        }
        controller.shutdown();
        self.bus.close();
        self.clock_task.abort();
    }

    /// Waits for the tasks to finish.
    pub async fn join(self) {
        for (name, task) in self.tasks {
            if let Err(e) = task.await {
                error!(task = name, err = e.to_string(), "Task failed.");
            }
        }
        if let Err(e) = self.clock_task.await {
            if !e.is_cancelled() {
                error!(task = "beat clock", err = e.to_string(), "Task failed.");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::{
        controller::Pad,
        events::Event,
        license::License,
        project::Parameter,
        testutil::{eventually_async, recv_until},
    };

    use super::*;

    fn project() -> Project {
        let mut project = Project::new("Runtime", 1);
        project.parameters.push(Parameter::new("Cutoff", "", 74));
        project.parameters.push(Parameter::new("Drive", "", 12));
        project
    }

    fn config() -> crate::config::Snapblaster {
        crate::config::Snapblaster::default()
            .with_controller(crate::config::Controller::new(Model::Generic, None))
            .with_output(crate::config::Output::new("mock-output", 1))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pad_press_to_cc() {
        let runtime = Runtime::start(&config(), project()).expect("runtime should start");
        let mut subscription = runtime.bus().subscribe("test");
        assert_eq!(License::free(), runtime.store().license());

        runtime
            .controller()
            .handle_note_input(8, 127)
            .expect("note should map to a pad");

        let events = recv_until(&mut subscription, |event| {
            matches!(event, Event::CcValueChanged { param: 1, .. })
        })
        .await;
        assert!(events.contains(&Event::SnapAdded { bank: 0, snap: 0 }));
        assert_eq!(Some(0), runtime.store().session().snap);

        runtime.trigger().edit_parameter(0, 99).expect("edit");
        recv_until(&mut subscription, |event| {
            *event
                == Event::CcValueChanged {
                    param: 0,
                    cc: 74,
                    value: 99,
                }
        })
        .await;

        runtime.shutdown();
        tokio::time::timeout(Duration::from_secs(5), runtime.join())
            .await
            .expect("runtime should stop after shutdown");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_clock_drives_tempo() {
        let runtime = Runtime::start(&config(), project()).expect("runtime should start");
        let mut subscription = runtime.bus().subscribe("test");

        runtime.clock().set_tempo(600.0).await.expect("tempo");
        runtime.clock().enable().await.expect("enable");
        recv_until(&mut subscription, |event| {
            matches!(event, Event::BarOccurred { bar: 1 })
        })
        .await;

        runtime.shutdown();
        tokio::time::timeout(Duration::from_secs(5), runtime.join())
            .await
            .expect("runtime should stop after shutdown");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rebind_controller_keeps_session() {
        let runtime = Runtime::start(&config(), project()).expect("runtime should start");
        runtime.trigger().press(Pad::new(1, 3));
        assert_eq!(Some(3), runtime.store().session().snap);

        runtime.rebind_controller(Model::ApcMini, Some("mock-apc"));
        let controller = runtime.controller();
        assert_eq!(Model::ApcMini, controller.model());
        let device = controller.device().expect("hardware controller has a device");
        assert_eq!("mock-apc", device.name());

        // The new controller's input reaches the trigger engine.
        let mut subscription = runtime.bus().subscribe("test");
        controller.handle_note_input(48, 127).expect("pad (1, 0)");
        recv_until(&mut subscription, |event| {
            *event == Event::SnapAdded { bank: 0, snap: 0 }
        })
        .await;

        let store = runtime.store().clone();
        eventually_async(
            || {
                let store = store.clone();
                async move { store.session().snap == Some(0) }
            },
            "Pad press never selected the new snap",
        )
        .await;
    }
}
