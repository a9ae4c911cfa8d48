//! Lazy, streaming access to the records produced by one statement.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::rc::Rc;

use crate::connection::Conn;
use crate::errors::{Error, Result, ServerFailure};
use crate::summary::{Plan, StatementType, Summary, UpdateCounts};
use crate::value::Value;

/// One row of a result. Cheap to clone; a record and its values stay valid
/// for as long as the caller holds it, regardless of further stream
/// progress.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    fields: Rc<Vec<String>>,
    values: Rc<Vec<Value>>,
}

impl Record {
    pub(crate) fn new(fields: Rc<Vec<String>>, values: Vec<Value>) -> Self {
        Record {
            fields,
            values: Rc::new(values),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The value at `index`, by position.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// The value under the named field.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        let index = self.fields.iter().position(|f| f == name)?;
        self.values.get(index)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn field_names(&self) -> &[String] {
        &self.fields
    }
}

/// The mutable state shared between a [`ResultStream`] handle and the
/// connection's reply dispatch.
#[derive(Debug)]
pub(crate) struct StreamState {
    /// The connection's reset epoch when the stream was opened. A stream
    /// from an earlier epoch is finalized with `SessionReset` on its next
    /// observation.
    pub epoch: u64,
    pub fields: Option<Rc<Vec<String>>>,
    /// Records fetched from the connection but not yet delivered.
    pub ready: VecDeque<Record>,
    /// The RUN reply has been observed.
    pub run_done: bool,
    /// No further replies will arrive for this stream.
    pub ended: bool,
    pub closed: bool,
    /// Terminal error, when the stream did not end cleanly.
    pub failure: Option<Error>,
    /// Server-reported failure details, when a FAILURE ended the stream.
    pub details: Option<ServerFailure>,
    pub summary: Option<Summary>,
}

pub(crate) type StreamHandle = Rc<RefCell<StreamState>>;

impl StreamState {
    pub fn new(epoch: u64) -> Self {
        StreamState {
            epoch,
            fields: None,
            ready: VecDeque::new(),
            run_done: false,
            ended: false,
            closed: false,
            failure: None,
            details: None,
            summary: None,
        }
    }

    /// Finalize with an error. The first error wins; later ones are
    /// redundant observations of the same terminal condition.
    pub fn fail(&mut self, err: Error) {
        self.ended = true;
        if self.failure.is_none() {
            self.failure = Some(err);
        }
    }

    pub fn finish(&mut self, summary: Summary) {
        if !self.ended {
            self.summary = Some(summary);
            self.ended = true;
        }
    }

    pub fn push_record(&mut self, values: Vec<Value>) {
        let fields = self.fields.clone().unwrap_or_default();
        self.ready.push_back(Record::new(fields, values));
    }

    fn terminal(&self) -> Option<Error> {
        self.failure.clone()
    }
}

/// A handle on the records and summary of one running statement.
///
/// Every operation that needs data not yet received drives the connection's
/// pipeline, and may therefore block on the transport.
pub struct ResultStream<IO: Read + Write> {
    conn: Rc<RefCell<Conn<IO>>>,
    state: StreamHandle,
}

impl<IO: Read + Write> ResultStream<IO> {
    pub(crate) fn new(conn: Rc<RefCell<Conn<IO>>>, state: StreamHandle) -> Self {
        ResultStream { conn, state }
    }

    // Apply connection-level conditions (reset, death) to this stream before
    // looking at its state.
    fn sync_poison(&self) {
        let conn = self.conn.borrow();
        let mut st = self.state.borrow_mut();
        if st.ended {
            return;
        }
        if st.epoch < conn.reset_epoch() {
            st.ready.clear();
            st.fail(Error::SessionReset);
        } else if conn.is_defunct() {
            st.fail(Error::SessionEnded);
        }
    }

    fn pump(&self) -> Result<()> {
        self.conn.borrow_mut().pump()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state.borrow().closed {
            return Err(Error::InvalidArgument("result stream is closed"));
        }
        Ok(())
    }

    /// Whether the statement failed. Drives the pipeline until the RUN reply
    /// has been observed, then reports the stream's terminal error, if any.
    pub fn check_failure(&mut self) -> Result<()> {
        loop {
            self.sync_poison();
            {
                let st = self.state.borrow();
                if let Some(err) = st.terminal() {
                    return Err(err);
                }
                if st.run_done || st.ended {
                    return Ok(());
                }
            }
            self.pump()?;
        }
    }

    /// The code and message of the server failure that ended this stream.
    pub fn failure_details(&self) -> Option<ServerFailure> {
        self.state.borrow().details.clone()
    }

    /// The result's field names. Blocks until the RUN reply is observed.
    pub fn fields(&mut self) -> Result<Rc<Vec<String>>> {
        self.ensure_open()?;
        loop {
            self.sync_poison();
            {
                let st = self.state.borrow();
                if let Some(fields) = &st.fields {
                    return Ok(fields.clone());
                }
                if let Some(err) = st.terminal() {
                    return Err(err);
                }
                if st.ended {
                    return Err(Error::NoResultsAvailable);
                }
            }
            self.pump()?;
        }
    }

    /// Number of fields per record.
    pub fn nfields(&mut self) -> Result<usize> {
        Ok(self.fields()?.len())
    }

    /// Name of field `index`.
    pub fn fieldname(&mut self, index: usize) -> Result<String> {
        self.fields()?
            .get(index)
            .cloned()
            .ok_or(Error::OutOfRange("field index"))
    }

    /// The next record, or `None` once the stream has ended cleanly.
    /// A terminal failure is reported instead, on this and every later call.
    pub fn fetch_next(&mut self) -> Result<Option<Record>> {
        self.ensure_open()?;
        loop {
            self.sync_poison();
            {
                let mut st = self.state.borrow_mut();
                if let Some(record) = st.ready.pop_front() {
                    return Ok(Some(record));
                }
                if st.ended {
                    return match st.terminal() {
                        Some(err) => Err(err),
                        None => Ok(None),
                    };
                }
            }
            self.pump()?;
        }
    }

    /// The record `depth` positions ahead of the cursor, without advancing
    /// it: `peek(0)` returns what the next [`ResultStream::fetch_next`]
    /// will.
    pub fn peek(&mut self, depth: usize) -> Result<Option<Record>> {
        self.ensure_open()?;
        loop {
            self.sync_poison();
            {
                let st = self.state.borrow();
                if let Some(record) = st.ready.get(depth) {
                    return Ok(Some(record.clone()));
                }
                if st.ended {
                    return match st.terminal() {
                        Some(err) => Err(err),
                        None => Ok(None),
                    };
                }
            }
            self.pump()?;
        }
    }

    /// The statement's type, available once the stream has ended.
    pub fn statement_type(&self) -> Result<StatementType> {
        let st = self.state.borrow();
        if let Some(err) = st.terminal() {
            return Err(err);
        }
        st.summary
            .as_ref()
            .and_then(|s| s.statement_type)
            .ok_or(Error::NoResultsAvailable)
    }

    /// The statement's update counts, available once the stream has ended.
    /// A read-only statement reports all-zero counts.
    pub fn update_counts(&self) -> Result<UpdateCounts> {
        let st = self.state.borrow();
        if let Some(err) = st.terminal() {
            return Err(err);
        }
        match &st.summary {
            Some(summary) => Ok(summary.counts.unwrap_or_default()),
            None => Err(Error::NoResultsAvailable),
        }
    }

    /// The execution plan or profile, when the statement produced one.
    pub fn plan(&self) -> Result<Plan> {
        let st = self.state.borrow();
        if let Some(err) = st.terminal() {
            return Err(err);
        }
        match &st.summary {
            Some(summary) => summary.plan.clone().ok_or(Error::NoPlanAvailable),
            None => Err(Error::NoResultsAvailable),
        }
    }

    /// Discard everything still buffered or in flight for this stream.
    ///
    /// Always succeeds: a failure that ended the stream early was either
    /// already reported or is dropped here.
    pub fn close(&mut self) -> Result<()> {
        loop {
            self.sync_poison();
            {
                let conn = self.conn.borrow();
                let mut st = self.state.borrow_mut();
                st.ready.clear();
                if st.ended || !conn.is_usable() {
                    st.closed = true;
                    return Ok(());
                }
            }
            if self.pump().is_err() {
                let mut st = self.state.borrow_mut();
                st.ready.clear();
                st.fail(Error::SessionEnded);
                st.closed = true;
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_lookup_by_position_and_name() {
        let fields = Rc::new(vec!["id".to_string(), "name".to_string()]);
        let record = Record::new(fields, vec![Value::Int(7), Value::from("Alice")]);
        assert_eq!(record.len(), 2);
        assert_eq!(record.get(0), Some(&Value::Int(7)));
        assert_eq!(record.get(2), None);
        assert_eq!(record.get_by_name("name"), Some(&Value::from("Alice")));
        assert_eq!(record.get_by_name("age"), None);
        assert_eq!(record.field_names(), ["id", "name"]);
    }

    #[test]
    fn records_stay_valid_when_cloned_out_of_the_stream() {
        let fields = Rc::new(vec!["n".to_string()]);
        let mut state = StreamState::new(0);
        state.fields = Some(fields);
        state.push_record(vec![Value::Int(1)]);
        let retained = state.ready.pop_front().unwrap();
        drop(state);
        assert_eq!(retained.get(0), Some(&Value::Int(1)));
    }

    #[test]
    fn first_failure_wins() {
        let mut state = StreamState::new(0);
        state.fail(Error::SessionReset);
        state.fail(Error::SessionEnded);
        assert!(matches!(state.failure, Some(Error::SessionReset)));
        assert!(state.ended);
        // a clean finish after a failure must not erase it
        state.finish(Summary::default());
        assert!(state.summary.is_none());
    }
}
