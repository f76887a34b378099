//! `futures`-based adapter over the suspension protocol. The reader/engine
//! core stays synchronous (it can't assume an executor under `no_std`); this
//! module is the `std`-only convenience layer that lets a caller already
//! inside an async runtime `.await` a parse instead of hand-rolling the
//! retry loop, the same way an async-trait layer wraps a synchronous
//! transport below it.
use futures_util::stream::{Stream, StreamExt};

use crate::error::{FieldPath, ParseError};
use crate::reader::{BitReader, Chunk};
use crate::value::Described;

/// Parses `T` from `reader`, pulling more chunks from `source` whenever the
/// engine suspends. `reader` must have `retain` enabled (required by
/// `engine::parse_resumable`). Ends the reader and attempts one final parse
/// once `source` is exhausted, so a source that ends mid-record still
/// surfaces the engine's own terminal error rather than hanging forever.
///
/// Holds the reader's outstanding-read guard for the whole retry loop (not
/// just one attempt) so a second `parse_async`/`parse_resumable` call on the
/// same reader while this one is still awaiting `source` is rejected rather
/// than silently interleaving reads on the same cursor.
pub async fn parse_async<T, S>(reader: &mut BitReader, source: &mut S) -> Result<T, ParseError>
where
    T: Described,
    S: Stream<Item = Chunk> + Unpin,
{
    if !reader.retain() {
        return Err(ParseError::ReaderNotRetained);
    }
    reader.begin_suspension().map_err(|e| ParseError::Reader {
        path: FieldPath::default(),
        source: e,
    })?;
    let result = parse_async_inner::<T, S>(reader, source).await;
    reader.end_suspension();
    result
}

async fn parse_async_inner<T, S>(reader: &mut BitReader, source: &mut S) -> Result<T, ParseError>
where
    T: Described,
    S: Stream<Item = Chunk> + Unpin,
{
    let mut exhausted = false;
    loop {
        match crate::engine::parse_resumable_inner::<T>(reader) {
            Ok(value) => return Ok(value),
            Err(suspended @ ParseError::Suspended { .. }) => {
                if exhausted {
                    return Err(suspended);
                }
                match source.next().await {
                    Some(chunk) => reader.push(chunk).map_err(|e| ParseError::Reader {
                        path: FieldPath::default(),
                        source: e,
                    })?,
                    None => {
                        reader.end();
                        exhausted = true;
                    }
                }
            }
            Err(e) => return Err(e),
        }
    }
}
