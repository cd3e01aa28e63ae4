//! Rendering of kernel reports for the `kernscope` command line tool.

use anyhow::Result;
use clap::{Subcommand, ValueEnum};
use kernscope_core::{
    format_hex, Address, GlobalSnapshot, HexWidth, IntrospectorConfig, KernelIntrospector,
    TargetChannel, ThreadReport, TimerReport, TraceReport,
};
use serde_json::Value;
use std::collections::HashMap;

/// Printed instead of a report when the target is executing.
pub const RUNNING_NOTICE: &str = "Target is running, halt it to read kernel state.";

/// Which kernel view to read.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Threads in the registry
    Threads,
    /// Pending virtual timers
    Timers,
    /// Context switch trace buffer
    Trace,
    /// Kernel global variables
    Globals,
    /// Every view above
    All,
}

impl Command {
    const VIEWS: [Self; 4] = [Self::Threads, Self::Timers, Self::Trace, Self::Globals];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Threads => "threads",
            Self::Timers => "timers",
            Self::Trace => "trace",
            Self::Globals => "globals",
            Self::All => "all",
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Read the requested view(s) through `channel` and render them.
///
/// A single view propagates its error. With [`Command::All`] a failing view is
/// reported in place and the others are still read.
pub fn run<C: TargetChannel>(
    channel: C,
    command: Command,
    format: OutputFormat,
    config: IntrospectorConfig,
) -> Result<String> {
    let mut introspector = KernelIntrospector::with_config(channel, config);

    if command != Command::All {
        let Some(view) = read_view(&mut introspector, command)? else {
            return Ok(RUNNING_NOTICE.to_string());
        };
        return match format {
            OutputFormat::Table => Ok(view.table()),
            OutputFormat::Json => Ok(serde_json::to_string_pretty(&view.json()?)?),
        };
    }

    let mut tables = Vec::new();
    let mut object = serde_json::Map::new();
    for view in Command::VIEWS {
        let rendered = match read_view(&mut introspector, view) {
            Ok(Some(rendered)) => rendered,
            Ok(None) => return Ok(RUNNING_NOTICE.to_string()),
            Err(e) => {
                log::warn!("{} view failed: {e:#}", view.name());
                tables.push(format!("[{}]\nerror: {e}\n", view.name()));
                object.insert(view.name().to_string(), serde_json::json!({ "error": e.to_string() }));
                continue;
            }
        };
        match format {
            OutputFormat::Table => tables.push(format!("[{}]\n{}", view.name(), rendered.table())),
            OutputFormat::Json => {
                object.insert(view.name().to_string(), rendered.json()?);
            }
        }
    }

    match format {
        OutputFormat::Table => Ok(tables.join("\n")),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&Value::Object(object))?),
    }
}

enum View {
    Threads(ThreadReport),
    Timers(TimerReport),
    Trace {
        trace: TraceReport,
        names: HashMap<Address, String>,
    },
    Globals(GlobalSnapshot),
}

fn read_view<C: TargetChannel>(
    introspector: &mut KernelIntrospector<C>,
    command: Command,
) -> Result<Option<View>> {
    let view = match command {
        Command::Threads => introspector.read_threads()?.map(View::Threads),
        Command::Timers => introspector.read_timers()?.map(View::Timers),
        Command::Trace => introspector.read_trace_buffer()?.map(|trace| View::Trace {
            trace,
            names: thread_names(introspector),
        }),
        Command::Globals => introspector.read_global_variables()?.map(View::Globals),
        Command::All => anyhow::bail!("`all` is not a single view"),
    };
    Ok(view)
}

/// Names of the current threads, for labelling trace entries. Best effort.
fn thread_names<C: TargetChannel>(introspector: &mut KernelIntrospector<C>) -> HashMap<Address, String> {
    match introspector.read_threads() {
        Ok(Some(threads)) => threads
            .iter()
            .filter_map(|(addr, thread)| Some((*addr, thread.name.as_ref().present()?.to_string())))
            .collect(),
        Ok(None) => HashMap::new(),
        Err(e) => {
            log::debug!("Thread names unavailable for trace: {e}");
            HashMap::new()
        }
    }
}

impl View {
    fn json(&self) -> serde_json::Result<Value> {
        match self {
            Self::Threads(threads) => serde_json::to_value(threads),
            Self::Timers(timers) => serde_json::to_value(timers),
            Self::Trace { trace, .. } => serde_json::to_value(trace),
            Self::Globals(globals) => serde_json::to_value(globals),
        }
    }

    fn table(&self) -> String {
        match self {
            Self::Threads(threads) => threads_table(threads),
            Self::Timers(timers) => timers_table(timers),
            Self::Trace { trace, names } => trace_table(trace, names),
            Self::Globals(globals) => globals_table(globals),
        }
    }
}

fn word(value: u32) -> String {
    format!("0x{}", format_hex(u64::from(value), HexWidth::Dword))
}

fn threads_table(threads: &ThreadReport) -> String {
    let mut table = Table::new([
        "Address", "StkLimit", "Stack", "StkUnused", "Name", "State", "Flags", "Prio", "Refs",
        "Time", "WtObj",
    ]);
    for (addr, thread) in threads.iter() {
        table.row([
            addr.hex(),
            thread.stack_limit.map(Address::hex).to_string(),
            thread.stack_pointer.map(Address::hex).to_string(),
            thread.unused_stack.to_string(),
            thread.name.to_string(),
            thread.state_label.to_string(),
            format!("0x{}", format_hex(u64::from(thread.flags), HexWidth::Byte)),
            thread.priority.to_string(),
            thread.ref_count.to_string(),
            thread.cumulative_time.to_string(),
            thread.wait_object.map(Address::hex).to_string(),
        ]);
    }
    table.render()
}

fn timers_table(timers: &TimerReport) -> String {
    let mut table = Table::new(["Address", "Time", "Delta", "Callback", "Param"]);
    for (addr, deadline, timer) in timers.deadlines() {
        table.row([
            addr.hex(),
            deadline.to_string(),
            format!("+{}", timer.delta),
            timer.callback.hex(),
            word(timer.parameter),
        ]);
    }
    table.render()
}

fn trace_table(trace: &TraceReport, names: &HashMap<Address, String>) -> String {
    let label = |addr: Address| match names.get(&addr) {
        Some(name) => format!("{} \"{name}\"", addr.hex()),
        None => addr.hex(),
    };
    let mut table = Table::new(["Event", "Time", "Previous", "State", "WtObj", "Current"]);
    for switch in trace.switches() {
        table.row([
            switch.index.to_string(),
            switch.event.timestamp.to_string(),
            switch.previous.map_or_else(|| "-".to_string(), label),
            switch.event.state_label.to_string(),
            switch.event.wait_object.hex(),
            label(switch.event.thread),
        ]);
    }
    table.render()
}

fn globals_table(globals: &GlobalSnapshot) -> String {
    let mut table = Table::new(["Variable", "Value"]);
    for (name, value) in globals.entries() {
        table.row([name.to_string(), value]);
    }
    table.render()
}

/// Left-aligned text columns separated by two spaces.
struct Table<const N: usize> {
    headers: [&'static str; N],
    rows: Vec<[String; N]>,
}

impl<const N: usize> Table<N> {
    const fn new(headers: [&'static str; N]) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    fn row(&mut self, cells: [String; N]) {
        self.rows.push(cells);
    }

    fn render(&self) -> String {
        let mut widths = self.headers.map(str::len);
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.len());
            }
        }

        let mut out = String::new();
        push_line(&mut out, self.headers.iter().copied(), &widths);
        for row in &self.rows {
            push_line(&mut out, row.iter().map(String::as_str), &widths);
        }
        out
    }
}

fn push_line<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>, widths: &[usize]) {
    let padded: Vec<String> = cells
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect();
    out.push_str(padded.join("  ").trim_end());
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_alignment() {
        let mut table = Table::new(["A", "Name"]);
        table.row(["0x1".to_string(), "x".to_string()]);
        table.row(["1".to_string(), "longer".to_string()]);
        assert_eq!(table.render(), "A    Name\n0x1  x\n1    longer\n");
    }

    #[test]
    fn test_command_names() {
        assert_eq!(Command::Threads.name(), "threads");
        assert_eq!(Command::VIEWS.len(), 4);
    }
}
