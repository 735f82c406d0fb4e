//! Listing and pagination parameters for adapter queries.
use std::str::FromStr;

/// Adapter columns that may be filtered or sorted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterField {
    Name,
    CreatedTime,
    Type,
    Model,
    Host,
    Port,
    User,
    DatabaseType,
    Database,
    Table,
    IsEnabled,
}

impl AdapterField {
    /// Column name in the adapters table.
    pub fn column(&self) -> &'static str {
        match self {
            AdapterField::Name => "name",
            AdapterField::CreatedTime => "created_time",
            AdapterField::Type => "adapter_type",
            AdapterField::Model => "model",
            AdapterField::Host => "host",
            AdapterField::Port => "port",
            AdapterField::User => "db_user",
            AdapterField::DatabaseType => "database_type",
            AdapterField::Database => "database_name",
            AdapterField::Table => "table_name",
            AdapterField::IsEnabled => "is_enabled",
        }
    }
}

impl FromStr for AdapterField {
    type Err = String;

    /// Accepts both the JSON (camelCase) and column (snake_case) spellings.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "name" => Ok(AdapterField::Name),
            "createdTime" | "created_time" => Ok(AdapterField::CreatedTime),
            "type" => Ok(AdapterField::Type),
            "model" => Ok(AdapterField::Model),
            "host" => Ok(AdapterField::Host),
            "port" => Ok(AdapterField::Port),
            "user" => Ok(AdapterField::User),
            "databaseType" | "database_type" => Ok(AdapterField::DatabaseType),
            "database" => Ok(AdapterField::Database),
            "table" => Ok(AdapterField::Table),
            "isEnabled" | "is_enabled" => Ok(AdapterField::IsEnabled),
            other => Err(format!("unsupported adapter field: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascend,
    Descend,
}

impl SortOrder {
    /// `ascend` sorts ascending; every other value sorts descending.
    pub fn parse(value: &str) -> Self {
        if value == "ascend" {
            SortOrder::Ascend
        } else {
            SortOrder::Descend
        }
    }
}

/// Substring filter on one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFilter {
    pub field: AdapterField,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub filter: Option<FieldFilter>,
    pub sort_field: AdapterField,
    pub sort_order: SortOrder,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

impl Default for PageRequest {
    /// Unfiltered, unpaged, newest first.
    fn default() -> Self {
        Self {
            filter: None,
            sort_field: AdapterField::CreatedTime,
            sort_order: SortOrder::Descend,
            offset: None,
            limit: None,
        }
    }
}

impl PageRequest {
    /// Build from raw query parameters. Empty strings mean "not given"; the
    /// sort falls back to newest first unless both field and order are set.
    pub fn from_params(
        field: &str,
        value: &str,
        sort_field: &str,
        sort_order: &str,
        offset: Option<u64>,
        limit: Option<u64>,
    ) -> Result<Self, String> {
        let mut request = PageRequest {
            offset,
            limit,
            ..Default::default()
        };
        if !field.is_empty() && !value.is_empty() {
            request.filter = Some(FieldFilter {
                field: field.parse()?,
                value: value.to_string(),
            });
        }
        if !sort_field.is_empty() && !sort_order.is_empty() {
            request.sort_field = sort_field.parse()?;
            request.sort_order = SortOrder::parse(sort_order);
        }
        Ok(request)
    }

    /// Offset and limit apply only when both are present.
    pub fn window(&self) -> Option<(u64, u64)> {
        self.offset.zip(self.limit)
    }
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_params_default_to_newest_first() {
        let request = PageRequest::from_params("", "", "", "", None, None).expect("request");
        assert_eq!(request, PageRequest::default());
    }

    #[test]
    fn filter_requires_both_field_and_value() {
        let request = PageRequest::from_params("host", "", "", "", None, None).expect("request");
        assert!(request.filter.is_none());
        let request =
            PageRequest::from_params("host", "db", "", "", None, None).expect("request");
        assert_eq!(
            request.filter,
            Some(FieldFilter {
                field: AdapterField::Host,
                value: "db".into()
            })
        );
    }

    #[test]
    fn sort_order_only_ascend_is_ascending() {
        let request =
            PageRequest::from_params("", "", "name", "ascend", None, None).expect("request");
        assert_eq!(request.sort_field, AdapterField::Name);
        assert_eq!(request.sort_order, SortOrder::Ascend);
        assert_eq!(SortOrder::parse("descend"), SortOrder::Descend);
        assert_eq!(SortOrder::parse("sideways"), SortOrder::Descend);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = PageRequest::from_params("password", "x", "", "", None, None).unwrap_err();
        assert!(err.contains("password"));
    }

    #[test]
    fn window_needs_offset_and_limit() {
        let mut request = PageRequest {
            offset: Some(10),
            ..Default::default()
        };
        assert_eq!(request.window(), None);
        request.limit = Some(5);
        assert_eq!(request.window(), Some((10, 5)));
    }
}
