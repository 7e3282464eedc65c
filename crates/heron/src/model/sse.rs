#[cfg(test)]
use std::collections::VecDeque;

use bytes::Bytes;
use reqwest::Response;

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Error {
    Transport,
    InvalidPayload,
}

/// An adapter for streaming byte chunks.
pub(crate) enum Chunks {
    Response(Response),
    #[cfg(test)]
    Scripted(VecDeque<Bytes>),
}

impl Chunks {
    pub(crate) fn from_response(response: Response) -> Self {
        Chunks::Response(response)
    }

    #[cfg(test)]
    pub(crate) fn scripted(chunks: VecDeque<Bytes>) -> Self {
        Chunks::Scripted(chunks)
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        match self {
            Chunks::Response(response) => {
                response.chunk().await.map_err(|_| Error::Transport)
            }
            #[cfg(test)]
            Chunks::Scripted(chunks) => Ok(chunks.pop_front()),
        }
    }
}

/// A reader for server-sent events over a chunk stream. Only `data` fields
/// are surfaced; comments and other fields are skipped.
pub(crate) struct Sse {
    buf: String,
    chunks: Chunks,
}

impl Sse {
    pub(crate) fn new(chunks: Chunks) -> Self {
        Self {
            buf: String::new(),
            chunks,
        }
    }

    pub(crate) async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            if let Some(event) = self.try_parse_event() {
                return Ok(Some(event));
            }
            let Some(bytes) = self.chunks.next_chunk().await? else {
                return Ok(None);
            };
            let Ok(text) = std::str::from_utf8(&bytes) else {
                return Err(Error::InvalidPayload);
            };
            self.buf.push_str(text);
        }
    }

    fn try_parse_event(&mut self) -> Option<String> {
        loop {
            // event  = *( comment / field ) end-of-line
            // field  = name [ colon [ space ] value ] end-of-line
            let end = self.buf.find("\n\n")?;
            let event: String = self.buf[..end].to_string();
            self.buf.drain(..end + 2);

            let mut data_lines: Vec<&str> = Vec::new();
            for line in event.lines() {
                if let Some(rest) = line.strip_prefix("data:") {
                    data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
                }
            }
            if !data_lines.is_empty() {
                return Some(data_lines.join("\n"));
            }
            // Not a data event; keep scanning.
        }
    }
}
