use std::sync::Arc;

use chrono::NaiveDateTime;
use sv_protocol::{parser::CONTROL_MODE, Clock, ControlCommand, FieldMap, FieldValue, Mission};
use tokio::sync::{mpsc, oneshot};

// Define the types of signals that can be sent to the AppState actor
#[derive(Debug)]
pub enum StateSignal {
    ReturnState {
        result_sender: oneshot::Sender<FieldMap>,
    },
    ReturnLastUpdated {
        result_sender: oneshot::Sender<Option<NaiveDateTime>>,
    },
    UpdateState {
        state: FieldMap,
        result_sender: oneshot::Sender<bool>,
    },
    ClearState {
        result_sender: oneshot::Sender<bool>,
    },
}

// App state - has a receiver to receive signals and a trait to respond to it, no memory sharing
pub struct AppState {
    state: FieldMap,
    last_updated: Option<NaiveDateTime>,
    receiver: mpsc::Receiver<StateSignal>,
    clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(receiver: mpsc::Receiver<StateSignal>, clock: Arc<dyn Clock>) -> Self {
        AppState {
            state: FieldMap::new(),
            last_updated: None,
            receiver,
            clock,
        }
    }

    // Process incoming signals until every proxy is dropped
    pub async fn process(mut self) {
        while let Some(signal) = self.receiver.recv().await {
            match signal {
                StateSignal::ReturnState { result_sender } => {
                    let _ = result_sender.send(self.state.clone());
                }
                StateSignal::ReturnLastUpdated { result_sender } => {
                    let _ = result_sender.send(self.last_updated);
                }
                StateSignal::UpdateState {
                    state,
                    result_sender,
                } => {
                    // later values overwrite earlier ones, keys that are not in the update are kept
                    self.state.extend(state);
                    self.last_updated = Some(self.clock.now());
                    let _ = result_sender.send(true);
                }
                StateSignal::ClearState { result_sender } => {
                    self.state.clear();
                    self.last_updated = None;
                    let _ = result_sender.send(true);
                }
            }
        }
    }
}

// Everything that can be written to the vehicle
#[derive(Debug)]
pub enum Outbound {
    Command(ControlCommand),
    Mission(Mission),
}

// Define the proxy struct for interacting with the actor
#[derive(Clone)]
pub struct AppStateProxy {
    pub state_sender: mpsc::Sender<StateSignal>,
    pub command_sender: mpsc::Sender<Outbound>,
    pub max_thrust: f64,
}

impl AppStateProxy {
    pub fn new(
        state_sender: mpsc::Sender<StateSignal>,
        command_sender: mpsc::Sender<Outbound>,
        max_thrust: f64,
    ) -> Self {
        AppStateProxy {
            state_sender,
            command_sender,
            max_thrust,
        }
    }

    // queue a command for the vehicle
    pub async fn send_command(&self, command: ControlCommand) -> anyhow::Result<()> {
        self.command_sender.send(Outbound::Command(command)).await?;
        Ok(())
    }

    // queue a full mission upload for the vehicle
    pub async fn send_mission(&self, mission: Mission) -> anyhow::Result<()> {
        self.command_sender.send(Outbound::Mission(mission)).await?;
        Ok(())
    }

    // send and return state signal and await the result
    pub async fn get_state(&self) -> anyhow::Result<FieldMap> {
        let (result_sender, result_receiver) = oneshot::channel();
        self.state_sender
            .send(StateSignal::ReturnState { result_sender })
            .await?;
        Ok(result_receiver.await?)
    }

    pub async fn get_last_updated(&self) -> anyhow::Result<Option<NaiveDateTime>> {
        let (result_sender, result_receiver) = oneshot::channel();
        self.state_sender
            .send(StateSignal::ReturnLastUpdated { result_sender })
            .await?;
        Ok(result_receiver.await?)
    }

    pub async fn get_control_mode(&self) -> anyhow::Result<Option<FieldValue>> {
        Ok(self.get_state().await?.get(CONTROL_MODE).cloned())
    }

    // Send values to be merged into the state
    pub async fn add_value_to_state(&self, state: FieldMap) -> anyhow::Result<bool> {
        let (result_sender, result_receiver) = oneshot::channel();
        self.state_sender
            .send(StateSignal::UpdateState {
                state,
                result_sender,
            })
            .await?;
        Ok(result_receiver.await?)
    }

    pub async fn clear_state(&self) -> anyhow::Result<bool> {
        let (result_sender, result_receiver) = oneshot::channel();
        self.state_sender
            .send(StateSignal::ClearState { result_sender })
            .await?;
        Ok(result_receiver.await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use sv_protocol::ManualClock;

    use super::*;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 17)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    fn spawn_state_with_clock(
        clock: Arc<ManualClock>,
    ) -> (AppStateProxy, mpsc::Receiver<Outbound>) {
        let (tx_state, rx_state) = mpsc::channel(8);
        let (tx_command, rx_command) = mpsc::channel(8);
        tokio::spawn(AppState::new(rx_state, clock).process());
        (AppStateProxy::new(tx_state, tx_command, 70.0), rx_command)
    }

    fn spawn_state() -> (AppStateProxy, mpsc::Receiver<Outbound>) {
        spawn_state_with_clock(Arc::new(ManualClock::new(start())))
    }

    fn map(pairs: &[(&str, FieldValue)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_updates_are_merged() {
        let (proxy, _rx) = spawn_state();
        assert!(proxy.get_state().await.unwrap().is_empty());
        assert_eq!(proxy.get_last_updated().await.unwrap(), None);

        proxy
            .add_value_to_state(map(&[
                ("Latitude", FieldValue::Numeric(41.9)),
                (CONTROL_MODE, FieldValue::from("Standby")),
            ]))
            .await
            .unwrap();
        proxy
            .add_value_to_state(map(&[(CONTROL_MODE, FieldValue::from("Waypoint"))]))
            .await
            .unwrap();

        let state = proxy.get_state().await.unwrap();
        assert_eq!(state.get("Latitude"), Some(&FieldValue::Numeric(41.9)));
        assert_eq!(
            proxy.get_control_mode().await.unwrap(),
            Some(FieldValue::from("Waypoint"))
        );
        assert!(proxy.get_last_updated().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_last_updated_follows_the_clock() {
        let clock = Arc::new(ManualClock::new(start()));
        let (proxy, _rx) = spawn_state_with_clock(clock.clone());

        proxy
            .add_value_to_state(map(&[("Heave", FieldValue::Numeric(0.1))]))
            .await
            .unwrap();
        assert_eq!(proxy.get_last_updated().await.unwrap(), Some(start()));

        clock.advance(chrono::Duration::seconds(5));
        proxy
            .add_value_to_state(map(&[("Heave", FieldValue::Numeric(0.2))]))
            .await
            .unwrap();
        assert_eq!(
            proxy.get_last_updated().await.unwrap(),
            Some(start() + chrono::Duration::seconds(5))
        );
    }

    #[tokio::test]
    async fn test_clear_state() {
        let (proxy, _rx) = spawn_state();
        proxy
            .add_value_to_state(map(&[("Heave", FieldValue::Numeric(0.0))]))
            .await
            .unwrap();
        proxy.clear_state().await.unwrap();

        assert!(proxy.get_state().await.unwrap().is_empty());
        assert_eq!(proxy.get_control_mode().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_commands_are_queued() {
        let (proxy, mut rx) = spawn_state();
        proxy.send_command(ControlCommand::Standby).await.unwrap();

        match rx.recv().await {
            Some(Outbound::Command(ControlCommand::Standby)) => {}
            other => panic!("unexpected outbound: {:?}", other),
        }
    }
}
