use articles::types::ArticleRow;
use chrono::{DateTime, Utc};
use prost::bytes;

/// Format BigQuery accepts for `timestamp` columns sent as strings.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%:z";

/// An [`ArticleRow`] encoded as a Storage Write API protobuf message.
///
/// Field tags follow the column order of [`articles::types::ARTICLE_COLUMNS`], starting at 1.
/// Timestamps are sent as strings, which BigQuery coerces into the `timestamp` column.
#[derive(Debug, Clone)]
pub struct BigQueryArticleRow(pub ArticleRow);

impl BigQueryArticleRow {
    fn published_at(&self) -> String {
        format_timestamp(&self.0.published_at)
    }
}

fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

impl prost::Message for BigQueryArticleRow {
    fn encode_raw(&self, buf: &mut impl bytes::BufMut)
    where
        Self: Sized,
    {
        let row = &self.0;
        prost::encoding::string::encode(1, &row.article_id, buf);
        prost::encoding::string::encode(2, &self.published_at(), buf);
        prost::encoding::string::encode(3, &row.title, buf);
        prost::encoding::string::encode(4, &row.link, buf);
        prost::encoding::string::encode(5, &row.categories, buf);
        prost::encoding::string::encode(6, &row.tags, buf);
    }

    fn merge_field(
        &mut self,
        _tag: u32,
        _wire_type: prost::encoding::WireType,
        _buf: &mut impl bytes::Buf,
        _ctx: prost::encoding::DecodeContext,
    ) -> Result<(), prost::DecodeError>
    where
        Self: Sized,
    {
        unimplemented!("article rows are only ever encoded");
    }

    fn encoded_len(&self) -> usize {
        let row = &self.0;
        prost::encoding::string::encoded_len(1, &row.article_id)
            + prost::encoding::string::encoded_len(2, &self.published_at())
            + prost::encoding::string::encoded_len(3, &row.title)
            + prost::encoding::string::encoded_len(4, &row.link)
            + prost::encoding::string::encoded_len(5, &row.categories)
            + prost::encoding::string::encoded_len(6, &row.tags)
    }

    fn clear(&mut self) {
        let row = &mut self.0;
        row.article_id.clear();
        row.title.clear();
        row.link.clear();
        row.categories.clear();
        row.tags.clear();
    }
}
