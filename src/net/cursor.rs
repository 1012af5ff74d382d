//! Lazy pull-based cursors over a query's response stream.
//!
//! A cursor exclusively owns its token. It buffers one batch at a time and
//! asks for the next batch (CONTINUE) only when a pull exhausts the buffer,
//! immediately before blocking on the reply. Dropping a cursor that still
//! has batches pending queues a STOP for the server; any frame still in
//! flight for the token is then dropped by the connection's reader.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::net::connection::Connection;
use crate::net::response::Response;
use crate::reql::datum::Datum;
use crate::reql::terms::ResponseType;

/// A stream of result datums for one query token.
pub struct Cursor {
    conn: Connection,
    token: u64,
    buffer: Vec<Datum>,
    index: usize,
    single: bool,
    no_more: bool,
    timeout: Option<Duration>,
}

impl Cursor {
    /// A cursor awaiting its first response.
    pub(crate) fn fresh(conn: Connection, token: u64) -> Cursor {
        Cursor {
            conn,
            token,
            buffer: Vec::new(),
            index: 0,
            single: false,
            no_more: false,
            timeout: None,
        }
    }

    /// The already-terminated cursor returned for `noreply` queries.
    pub(crate) fn noreply(conn: Connection, token: u64) -> Cursor {
        Cursor {
            conn,
            token,
            buffer: vec![Datum::Null],
            index: 0,
            single: true,
            no_more: true,
            timeout: None,
        }
    }

    /// Set the timeout applied to every blocking pull on this cursor.
    /// The default is to wait forever.
    pub fn with_timeout(mut self, timeout: Duration) -> Cursor {
        self.timeout = Some(timeout);
        self
    }

    /// The token identifying this query on the connection.
    pub fn token(&self) -> u64 {
        self.token
    }

    /// True while the cursor wraps a single atom that has not been unwrapped
    /// into a sequence.
    pub fn is_single(&self) -> bool {
        self.single
    }

    /// True once no further network interaction will happen for this cursor.
    pub fn no_more(&self) -> bool {
        self.no_more
    }

    /// Fold one response into the buffer, classifying by kind.
    pub(crate) fn add_response(&mut self, response: Response) -> Result<()> {
        match response.kind {
            ResponseType::SuccessSequence => {
                self.add_results(response.result);
                self.no_more = true;
            }
            ResponseType::SuccessPartial => {
                self.add_results(response.result);
            }
            ResponseType::SuccessAtom | ResponseType::ServerInfo => {
                if response.result.len() != 1 {
                    self.no_more = true;
                    return Err(Error::Protocol(format!(
                        "{} response with {} results",
                        response.kind.name(),
                        response.result.len()
                    )));
                }
                self.add_results(response.result);
                self.single = true;
                self.no_more = true;
            }
            ResponseType::WaitComplete
            | ResponseType::ClientError
            | ResponseType::CompileError
            | ResponseType::RuntimeError => {
                self.no_more = true;
                return Err(response.into_error());
            }
        }
        Ok(())
    }

    fn add_results(&mut self, results: Vec<Datum>) {
        if self.index >= self.buffer.len() {
            self.buffer = results;
            self.index = 0;
        } else {
            self.buffer.extend(results);
        }
    }

    /// The implicit CONTINUE: sent only when a pull has exhausted the
    /// buffer, right before blocking on the next batch.
    async fn fetch_more(&mut self) -> Result<()> {
        self.conn.continue_query(self.token).await?;
        let response = self
            .conn
            .wait_for_response(self.token, self.timeout)
            .await?;
        self.add_response(response)
    }

    /// One-time unwrap of a single atom that holds an array.
    fn convert_single(&mut self) -> Result<()> {
        if self.index != 0 {
            return Err(Error::Driver("cursor already consumed".into()));
        }
        if self.buffer.len() != 1 {
            return Err(Error::Protocol(
                "single response does not hold exactly one value".into(),
            ));
        }
        match self.buffer.pop() {
            Some(Datum::Array(items)) => {
                self.buffer = items;
                self.single = false;
                Ok(())
            }
            Some(other) => {
                self.buffer.push(other);
                Err(Error::Driver("cursor value is not an array".into()))
            }
            None => Err(Error::Protocol(
                "single response does not hold exactly one value".into(),
            )),
        }
    }

    /// Whether another datum can be pulled, fetching batches as needed.
    pub async fn has_next(&mut self) -> Result<bool> {
        if self.single {
            self.convert_single()?;
        }
        loop {
            if self.index < self.buffer.len() {
                return Ok(true);
            }
            if self.no_more {
                return Ok(false);
            }
            self.fetch_more().await?;
        }
    }

    /// Pull the next datum; `NoMoreData` past the end of the stream.
    pub async fn next(&mut self) -> Result<Datum> {
        if !self.has_next().await? {
            return Err(Error::NoMoreData);
        }
        let datum = std::mem::replace(&mut self.buffer[self.index], Datum::Null);
        self.index += 1;
        Ok(datum)
    }

    /// Pull the next datum, `Ok(None)` at the end of the stream. The async
    /// equivalent of forward iteration:
    ///
    /// ```rust,ignore
    /// while let Some(doc) = cursor.try_next().await? { /* ... */ }
    /// ```
    pub async fn try_next(&mut self) -> Result<Option<Datum>> {
        if !self.has_next().await? {
            return Ok(None);
        }
        let datum = std::mem::replace(&mut self.buffer[self.index], Datum::Null);
        self.index += 1;
        Ok(Some(datum))
    }

    /// Look at the next datum without advancing.
    pub async fn peek(&mut self) -> Result<&Datum> {
        if !self.has_next().await? {
            return Err(Error::NoMoreData);
        }
        Ok(&self.buffer[self.index])
    }

    /// Invoke `f` on every remaining datum, in stream order.
    pub async fn each<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(Datum),
    {
        while self.has_next().await? {
            let datum = std::mem::replace(&mut self.buffer[self.index], Datum::Null);
            self.index += 1;
            f(datum);
        }
        Ok(())
    }

    /// Drop consumed elements and drain every remaining batch.
    async fn read_all(&mut self) -> Result<()> {
        if self.single {
            self.convert_single()?;
        }
        if self.index != 0 {
            self.buffer.drain(..self.index);
            self.index = 0;
        }
        while !self.no_more {
            self.fetch_more().await?;
        }
        Ok(())
    }

    /// Collect every remaining datum into an array. A single cursor is
    /// unwrapped first (an error if its value is not an array); a partially
    /// consumed stream keeps its leftover buffer tail.
    pub async fn to_array(mut self) -> Result<Vec<Datum>> {
        self.read_all().await?;
        Ok(std::mem::take(&mut self.buffer))
    }

    /// The single result of an atom query, or the full stream as an array
    /// datum. Consuming a single cursor twice is an error.
    pub async fn to_datum(mut self) -> Result<Datum> {
        if self.single {
            if self.index != 0 {
                return Err(Error::Driver("to_datum: cursor already consumed".into()));
            }
            if self.buffer.len() != 1 {
                return Err(Error::Protocol(
                    "single response does not hold exactly one value".into(),
                ));
            }
            return Ok(std::mem::replace(&mut self.buffer[0], Datum::Null));
        }
        self.read_all().await?;
        Ok(Datum::Array(std::mem::take(&mut self.buffer)))
    }

    /// Cancel the stream: emit STOP unless the stream is already complete.
    pub async fn close(&mut self) -> Result<()> {
        if !self.no_more {
            self.no_more = true;
            self.conn.stop_query(self.token).await?;
            self.conn.retire_token(self.token);
        }
        Ok(())
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        if !self.no_more {
            // non-blocking: the connection's dispatcher sends the STOP
            self.conn.stop_request(self.token);
            self.no_more = true;
        }
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("token", &self.token)
            .field("buffered", &(self.buffer.len() - self.index.min(self.buffer.len())))
            .field("single", &self.single)
            .field("no_more", &self.no_more)
            .finish()
    }
}
