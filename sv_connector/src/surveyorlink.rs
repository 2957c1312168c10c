use std::time::Duration;

use anyhow::anyhow;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{event, Level};

use sv_protocol::{sentence::CRLF, Dispatcher};

use crate::types::{AppStateProxy, Outbound};

const RECEIVE_BUFFER_LEN: usize = 2048;

// drop buffered text that never gets a line ending
const MAX_PENDING_LEN: usize = 16 * RECEIVE_BUFFER_LEN;

const SENTENCE_PAUSE: Duration = Duration::from_millis(5);
const FILE_DOWNLOAD_PAUSE: Duration = Duration::from_millis(100);

/// Reads telemetry from the vehicle, dispatches every complete line and merges the result into the state
pub async fn listen_to_surveyor<R>(
    mut reader: R,
    app_state_proxy: AppStateProxy,
    dispatcher: Dispatcher,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf: [u8; RECEIVE_BUFFER_LEN] = [0_u8; RECEIVE_BUFFER_LEN];
    let mut pending = String::new();

    loop {
        let len = reader.read(&mut buf).await?;

        if len == 0 {
            event!(Level::ERROR, "Connection closed by the surveyor");
            return Err(anyhow!("Connection closed by the surveyor"));
        }

        pending.push_str(&String::from_utf8_lossy(&buf[..len]));

        let Some(blob) = take_complete_lines(&mut pending) else {
            if pending.len() > MAX_PENDING_LEN {
                event!(
                    Level::WARN,
                    "Discarding {} bytes of telemetry without a line ending",
                    pending.len()
                );
                pending.clear();
            }
            continue;
        };

        let state = dispatcher.dispatch(&blob);
        app_state_proxy.add_value_to_state(state).await?;
        event!(Level::TRACE, "Surveyor state updated");
    }
}

/// Removes and returns everything up to and including the last CRLF
fn take_complete_lines(pending: &mut String) -> Option<String> {
    let end = pending.rfind(CRLF)? + CRLF.len();
    let rest = pending.split_off(end);
    Some(std::mem::replace(pending, rest))
}

/// Writes queued commands and mission uploads to the vehicle
pub async fn listen_to_send_commands<W>(
    mut writer: W,
    mut rx: mpsc::Receiver<Outbound>,
    max_thrust: f64,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(outbound) = rx.recv().await {
        match outbound {
            Outbound::Command(command) => {
                write_sentence(&mut writer, &command.sentence(max_thrust)).await?;
                if command.is_file_download() {
                    tokio::time::sleep(FILE_DOWNLOAD_PAUSE).await;
                }
                event!(Level::INFO, "Command sent: {:?}", command);
            }
            Outbound::Mission(mission) => {
                let sequence = mission.upload_sequence(max_thrust);
                let last = sequence.len().saturating_sub(1);

                for (i, sentence) in sequence.iter().enumerate() {
                    write_sentence(&mut writer, sentence).await?;

                    // the first and last sentences switch file download mode on and off
                    if i == 0 || i == last {
                        tokio::time::sleep(FILE_DOWNLOAD_PAUSE).await;
                    }
                }

                event!(
                    Level::INFO,
                    "Mission sent: {} waypoints at throttle {}",
                    mission.waypoints().len(),
                    mission.throttle()
                );
            }
        }
    }

    Ok(())
}

async fn write_sentence<W>(writer: &mut W, sentence: &str) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if let Err(e) = writer.write_all(sentence.as_bytes()).await {
        event!(
            Level::ERROR,
            "Error sending sentence {:?}, error: {:?}",
            sentence,
            e
        );
        return Err(e.into());
    }
    writer.flush().await?;

    event!(Level::DEBUG, "Sentence sent: {:?}", sentence);
    tokio::time::sleep(SENTENCE_PAUSE).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, NaiveDateTime};
    use sv_protocol::{
        assemble_mission, ChecksumMode, ControlCommand, Coordinate, FieldValue, ManualClock,
    };

    use super::*;
    use crate::types::AppState;

    fn spawn_state() -> (AppStateProxy, mpsc::Sender<Outbound>, mpsc::Receiver<Outbound>) {
        let (tx_state, rx_state) = mpsc::channel(8);
        let (tx_command, rx_command) = mpsc::channel(8);
        tokio::spawn(AppState::new(rx_state, Arc::new(ManualClock::new(noon()))).process());
        (
            AppStateProxy::new(tx_state, tx_command.clone(), 70.0),
            tx_command,
            rx_command,
        )
    }

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 17)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(ChecksumMode::Lenient, Arc::new(ManualClock::new(noon())))
    }

    #[test]
    fn test_take_complete_lines() {
        let mut pending = "$PSEAA,1*00\r\n$PSEAD,L".to_string();
        assert_eq!(
            take_complete_lines(&mut pending),
            Some("$PSEAA,1*00\r\n".to_string())
        );
        assert_eq!(pending, "$PSEAD,L");
        assert_eq!(take_complete_lines(&mut pending), None);
        assert_eq!(pending, "$PSEAD,L");
    }

    #[tokio::test]
    async fn test_sentences_split_across_reads_are_parsed() {
        let (proxy, _tx, _rx) = spawn_state();
        let (mut vehicle, connector) = tokio::io::duplex(64);

        let listener = tokio::spawn(listen_to_surveyor(connector, proxy.clone(), dispatcher()));

        vehicle.write_all(b"$PSEAD,W,90.0,").await.unwrap();
        vehicle.write_all(b"25.0,0.0*00\r\n$GPGGA,115739.00,4158.8441,N,").await.unwrap();
        vehicle
            .write_all(b"09147.4416,W,4,13,0.9,255.747,M,-32.00,M,01,0000*6E\r\n")
            .await
            .unwrap();
        drop(vehicle);

        // a closed connection ends the listener with an error
        assert!(listener.await.unwrap().is_err());

        let state = proxy.get_state().await.unwrap();
        assert_eq!(
            state.get("Control Mode"),
            Some(&FieldValue::from("Waypoint"))
        );
        assert_eq!(state.get("Thrust (% Thrust)"), Some(&FieldValue::Numeric(25.0)));
        assert!(state.contains_key("Latitude"));
        assert_eq!(state.get("Day"), Some(&FieldValue::Integer(20240517)));
    }

    #[tokio::test]
    async fn test_commands_and_missions_are_written() {
        let (proxy, tx, rx) = spawn_state();
        let (connector, mut vehicle) = tokio::io::duplex(4096);

        let mission = assemble_mission(&[Coordinate::from((25.5, -80.75))], None, 30).unwrap();
        let expected_mission: String = mission.upload_sequence(70.0).concat();

        tx.send(Outbound::Command(ControlCommand::Standby)).await.unwrap();
        tx.send(Outbound::Mission(mission)).await.unwrap();
        drop(tx);
        drop(proxy);

        listen_to_send_commands(connector, rx, 70.0).await.unwrap();

        let mut written = String::new();
        vehicle.read_to_string(&mut written).await.unwrap();

        let standby = ControlCommand::Standby.sentence(70.0);
        assert!(written.starts_with(&standby));
        assert_eq!(&written[standby.len()..], expected_mission);
        assert!(written.contains("\r\n$PSEAR,0,000,030,0,000*4A\r\n$OIWPL,"));
    }
}
