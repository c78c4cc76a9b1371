use crate::{
    assembler::{Decoder, Event},
    observer::{DummyObserver, Observer},
    types::{DecodedBlock, TransactionTrace},
    DecoderConfig, Error,
};

/// Pulls lines from an instrumented node's output until a block (or a
/// transaction) is complete.
///
/// The end of the lines is the end of the stream, a partially read block is
/// never returned.
#[derive(Debug)]
pub struct ConsoleReader<I, O = DummyObserver> {
    lines: I,
    decoder: Decoder,
    observer: O,
}

impl<I> ConsoleReader<I>
where
    I: Iterator,
    I::Item: AsRef<str>,
{
    /// A reader with no observer.
    pub fn new(lines: I, config: DecoderConfig) -> Self {
        Self {
            lines,
            decoder: Decoder::new(config),
            observer: DummyObserver,
        }
    }
}

impl<I, O> ConsoleReader<I, O>
where
    I: Iterator,
    I::Item: AsRef<str>,
    O: Observer,
{
    /// Notify `observer` of every block read from now on.
    pub fn with_observer<NewO: Observer>(self, observer: NewO) -> ConsoleReader<I, NewO> {
        ConsoleReader {
            lines: self.lines,
            decoder: self.decoder,
            observer,
        }
    }

    #[allow(missing_docs)]
    pub fn observer(&self) -> &O {
        &self.observer
    }

    #[allow(missing_docs)]
    pub fn into_observer(self) -> O {
        self.observer
    }

    /// Read until the next block is assembled and normalized, [`None`] at
    /// the end of the stream.
    pub fn read_block(&mut self) -> Result<Option<DecodedBlock>, Error> {
        for line in self.lines.by_ref() {
            if let Some(Event::BlockCompleted { block, parse_time }) =
                self.decoder.feed(line.as_ref())?
            {
                self.observer.on_block(&block, parse_time);
                return Ok(Some(block));
            }
        }
        Ok(None)
    }

    /// Read until the next transaction ends, [`None`] at the end of the
    /// stream.
    ///
    /// Meant for streams of standalone transactions (e.g. traced calls), it
    /// is an error for more than one transaction to be pending.
    pub fn read_transaction(&mut self) -> Result<Option<TransactionTrace>, Error> {
        for line in self.lines.by_ref() {
            if let Some(Event::TransactionCompleted) = self.decoder.feed(line.as_ref())? {
                let mut traces = self.decoder.take_transactions();
                return match traces.len() {
                    1 => Ok(traces.pop()),
                    count => Err(Error::UnexpectedTransactionCount(count)),
                };
            }
        }
        Ok(None)
    }
}

impl<I, O> Iterator for ConsoleReader<I, O>
where
    I: Iterator,
    I::Item: AsRef<str>,
    O: Observer,
{
    type Item = Result<DecodedBlock, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_block().transpose()
    }
}
