use std::sync::Arc;

use mibridge::{
    EventTranslator, GdbConnection, MiCommand, MiEvent, OutboundPacket, RunControlEventProcessor,
    TranslatorError, VmNotification,
};

/// Stand-in wire packet: prints what a real encoder would transmit.
struct ConsolePacket(String);

impl OutboundPacket for ConsolePacket {
    fn send(self: Box<Self>) -> Result<(), TranslatorError> {
        println!("{}", self.0);
        Ok(())
    }
}

/// Translator used until a wire client is connected; every event becomes
/// a console line instead of a binary packet.
struct ConsoleTranslator;

impl EventTranslator for ConsoleTranslator {
    fn translate(&self, event: &MiEvent) -> Option<Box<dyn OutboundPacket>> {
        let location = event
            .data()
            .frame()
            .map(|frame| {
                format!(
                    " at {}:{}",
                    frame.function.unwrap_or_else(|| "?".into()),
                    frame
                        .line
                        .map(|l| l.to_string())
                        .unwrap_or_else(|| "?".into())
                )
            })
            .unwrap_or_default();
        Some(Box::new(ConsolePacket(format!("event: {event:?}{location}"))))
    }

    fn translate_vm(&self, notification: &VmNotification) -> Option<Box<dyn OutboundPacket>> {
        Some(Box::new(ConsolePacket(format!("vm event: {notification:?}"))))
    }
}

#[tokio::main]
async fn main() -> mibridge::Result<()> {
    // Initialize the logger first
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .with_module_level("mibridge", log::LevelFilter::Debug)
        .init()
        .unwrap();

    log::info!("jdbridge - MI to wire-protocol bridge starting...");

    mibridge::process::install_signal_protection();

    let program = std::env::args().nth(1);
    let gdb_path = std::env::var("JDBRIDGE_GDB").unwrap_or_else(|_| "gdb".to_string());

    let mut connection = GdbConnection::new();
    connection.start(&gdb_path).await?;

    let processor =
        RunControlEventProcessor::register(connection.registry(), Arc::new(ConsoleTranslator));

    if let Some(program) = program {
        connection
            .execute(MiCommand::file_exec_and_symbols(&program))
            .await?;
        let info = connection.execute(MiCommand::break_insert("main")).await?;
        log::info!("breakpoint {} set at program entry", info.breakpoint.number);
        connection.execute(MiCommand::exec_run()).await?;
    }

    log::info!("bridge running, press Ctrl+C to exit");
    tokio::signal::ctrl_c().await?;

    processor.dispose();
    connection.shutdown().await?;

    Ok(())
}
