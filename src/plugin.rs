use std::{
    io::{BufRead, Write},
    sync::Mutex,
    thread,
};

use anyhow::{Context, Error};
use log::{debug, error, warn};
use maplit::btreemap;

use pbvolume_api::plugin::{Call, Method, Reply, Request, Response, Volume};

use crate::{driver::VolumeDriver, registry::VolumeRecord};

/// Runs one plugin call against the driver. Failures become a response with
/// a non-empty `Err`.
pub fn dispatch(driver: &VolumeDriver, method: Method, request: &Request) -> Response {
    let method_name: &'static str = method.into();
    debug!("Handling {method_name} for '{}'", request.name);

    let name = request.name.as_str();
    let result = match method {
        Method::Activate => Ok(Response {
            implements: Some(vec!["VolumeDriver".into()]),
            ..Default::default()
        }),
        Method::Create => driver.create(name).map(|()| Response::default()),
        Method::Remove => driver.remove(name).map(|()| Response::default()),
        Method::Mount => driver.mount(name).map(|path| Response {
            mountpoint: Some(path.display().to_string()),
            ..Default::default()
        }),
        Method::Unmount => driver.unmount(name).map(|()| Response::default()),
        Method::Path => driver.path(name).map(|path| Response {
            mountpoint: Some(path.display().to_string()),
            ..Default::default()
        }),
        Method::Get => driver.get(name).map(|record| Response {
            volume: record.map(|record| describe(name, &record)),
            ..Default::default()
        }),
        Method::List => driver.list().map(|volumes| Response {
            volumes: Some(
                volumes
                    .into_iter()
                    .map(|(name, mount_path)| Volume {
                        name,
                        mountpoint: mount_path.display().to_string(),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        Method::Capabilities => Ok(Response {
            capabilities: Some(driver.capabilities()),
            ..Default::default()
        }),
    };

    result.unwrap_or_else(|e| {
        error!("{method_name} failed: {e:?}");
        Response::error(e.to_string())
    })
}

fn describe(name: &str, record: &VolumeRecord) -> Volume {
    Volume {
        name: name.into(),
        mountpoint: record.mount_path.display().to_string(),
        status: btreemap! {
            "Device".into() => record.device_path.display().to_string(),
            "VolumeId".into() => record.volume_id.clone(),
        },
    }
}

/// Serves JSON-lines calls from `reader`, one thread per call, writing each
/// reply as one line to `writer`. Returns once the input is exhausted and
/// every call has been answered.
pub fn serve<R, W>(driver: &VolumeDriver, reader: R, writer: &mut W) -> Result<(), Error>
where
    R: BufRead,
    W: Write + Send,
{
    let writer = Mutex::new(writer);

    thread::scope(|scope| {
        for line in reader.lines() {
            let line = line.context("Failed to read plugin call")?;
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<Call>(&line) {
                Ok(call) => {
                    let writer = &writer;
                    scope.spawn(move || {
                        let reply = Reply {
                            id: call.id.clone(),
                            response: dispatch(driver, call.method, &call.request),
                        };
                        if let Err(e) = write_reply(writer, &reply) {
                            error!("Failed to answer plugin call: {e:?}");
                        }
                    });
                }
                Err(e) => {
                    warn!("Ignoring malformed plugin call: {e}");
                    write_reply(
                        &writer,
                        &Reply {
                            id: None,
                            response: Response::error(format!("Malformed call: {e}")),
                        },
                    )?;
                }
            }
        }
        Ok(())
    })
}

fn write_reply<W: Write>(writer: &Mutex<&mut W>, reply: &Reply) -> Result<(), Error> {
    let line = serde_json::to_string(reply).context("Failed to serialize reply")?;
    let mut writer = writer
        .lock()
        .map_err(|_| anyhow::anyhow!("Reply writer lock is poisoned"))?;
    writeln!(writer, "{line}").context("Failed to write reply")?;
    writer.flush().context("Failed to flush reply")
}
