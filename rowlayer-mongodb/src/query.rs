//! Query translation from rowlayer predicates and queries to MongoDB syntax.
//!
//! Predicates become `$match` filter documents; a whole [`Query`] becomes an aggregation
//! pipeline so relation joins can be expressed as `$lookup` stages.

use bson::{Bson, Document, doc};

use rowlayer_core::{
    error::{ServiceError, ServiceResult},
    predicate::{Expr, FieldOp, QueryVisitor, WILDCARD},
    query::{JoinKind, Query, SortDirection},
};

/// Translates rowlayer predicates into MongoDB filter documents.
pub(crate) struct MongoQueryTranslator;

impl MongoQueryTranslator {
    pub fn translate(expr: &Expr) -> ServiceResult<Document> {
        MongoQueryTranslator.visit_expr(expr)
    }
}

impl QueryVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = ServiceError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        if exprs.is_empty() {
            return Ok(doc! {});
        }

        Ok(doc! {
            "$and": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        // An empty disjunction matches nothing.
        if exprs.is_empty() {
            return Ok(doc! { "$expr": false });
        }

        Ok(doc! {
            "$or": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$nor": [self.visit_expr(expr)?],
        })
    }

    fn visit_null(&mut self, field: &str, is_null: bool) -> Result<Self::Output, Self::Error> {
        Ok(if is_null {
            doc! { field: Bson::Null }
        } else {
            doc! { field: { "$ne": Bson::Null } }
        })
    }

    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: match op {
                FieldOp::Eq => doc! { "$eq": value },
                FieldOp::Ne => doc! { "$ne": value },
                FieldOp::Gt => doc! { "$gt": value },
                FieldOp::Gte => doc! { "$gte": value },
                FieldOp::Lt => doc! { "$lt": value },
                FieldOp::Lte => doc! { "$lte": value },
                FieldOp::In | FieldOp::NotIn => {
                    let Bson::Array(values) = value else {
                        return Err(ServiceError::validation(
                            format!("'{field}' membership test needs an array of values"),
                            Some(field),
                        ));
                    };

                    if *op == FieldOp::In {
                        doc! { "$in": values }
                    } else {
                        doc! { "$nin": values }
                    }
                }
                FieldOp::Like | FieldOp::ILike => match value {
                    Bson::String(pattern) => {
                        let mut regex = doc! { "$regex": like_to_regex(pattern) };
                        if *op == FieldOp::ILike {
                            regex.insert("$options", "i");
                        }
                        regex
                    }
                    _ => {
                        return Err(ServiceError::validation(
                            format!("'{field}' pattern match needs a string pattern"),
                            Some(field),
                        ));
                    }
                },
            }
        })
    }
}

/// Converts a SQL `LIKE` pattern into an anchored regular expression.
pub(crate) fn like_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() + 2);
    regex.push('^');

    for c in pattern.chars() {
        match c {
            WILDCARD => regex.push_str(".*"),
            '_' => regex.push('.'),
            '\\' | '.' | '+' | '*' | '?' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$' => {
                regex.push('\\');
                regex.push(c);
            }
            c => regex.push(c),
        }
    }

    regex.push('$');
    regex
}

/// Builds the aggregation pipeline that evaluates `query`.
///
/// With `count` set, ordering and pagination are dropped and the pipeline ends in a
/// `$count` stage producing a single `{ count }` document.
pub(crate) fn pipeline(query: &Query, count: bool) -> ServiceResult<Vec<Document>> {
    let mut stages = Vec::new();
    let mut hidden = vec![Bson::String("_id".into())];

    for join in &query.joins {
        let preserve = match join.kind {
            JoinKind::Left => true,
            JoinKind::Inner => false,
            JoinKind::Right => {
                return Err(ServiceError::database(format!(
                    "right join on '{}' is not supported by the MongoDB backend",
                    join.table
                )));
            }
        };

        stages.push(doc! {
            "$lookup": {
                "from": join.table.as_str(),
                "localField": join.local_field.as_str(),
                "foreignField": join.foreign_field.as_str(),
                "as": join.alias.as_str(),
            }
        });
        stages.push(doc! {
            "$unwind": {
                "path": format!("${}", join.alias),
                "preserveNullAndEmptyArrays": preserve,
            }
        });
        hidden.push(Bson::String(format!("{}._id", join.alias)));
    }

    if let Some(filter) = &query.filter {
        stages.push(doc! { "$match": MongoQueryTranslator::translate(filter)? });
    }

    if count {
        stages.push(doc! { "$count": "count" });
        return Ok(stages);
    }

    if !query.sort.is_empty() {
        let mut sort = Document::new();
        for term in &query.sort {
            sort.insert(
                term.field.clone(),
                match term.direction {
                    SortDirection::Asc => 1,
                    SortDirection::Desc => -1,
                },
            );
        }
        stages.push(doc! { "$sort": sort });
    }
    if let Some(offset) = query.offset {
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        stages.push(doc! { "$skip": offset });
    }
    if let Some(limit) = query.limit {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        stages.push(doc! { "$limit": limit });
    }
    stages.push(doc! { "$unset": hidden });

    Ok(stages)
}

#[cfg(test)]
mod tests {
    use rowlayer_core::{predicate::Filter, query::Join};

    use super::*;

    #[test]
    fn like_patterns_become_anchored_regexes() {
        assert_eq!(like_to_regex("%report"), "^.*report$");
        assert_eq!(like_to_regex("a_c"), "^a.c$");
        assert_eq!(like_to_regex("1.5%"), "^1\\.5.*$");
    }

    #[test]
    fn ilike_is_case_insensitive() {
        let filter = MongoQueryTranslator::translate(&Filter::ilike("title", "%x%")).unwrap();

        assert_eq!(
            filter,
            doc! { "title": { "$regex": "^.*x.*$", "$options": "i" } }
        );
    }

    #[test]
    fn null_checks_and_negation() {
        assert_eq!(
            MongoQueryTranslator::translate(&Filter::is_null("deleted_at")).unwrap(),
            doc! { "deleted_at": Bson::Null }
        );
        assert_eq!(
            MongoQueryTranslator::translate(&Filter::eq("done", true).not()).unwrap(),
            doc! { "$nor": [{ "done": { "$eq": true } }] }
        );
    }

    #[test]
    fn membership_translates_to_in_and_nin() {
        assert_eq!(
            MongoQueryTranslator::translate(&Filter::not_in("status", ["a", "b"])).unwrap(),
            doc! { "status": { "$nin": ["a", "b"] } }
        );
    }

    #[test]
    fn pipeline_orders_stages() {
        let query = Query::new()
            .join(Join::inner("users", "owner", "owner_id", "id"))
            .filter(Filter::eq("owner.name", "Ada"))
            .order_by("created_at", SortDirection::Desc)
            .offset(10)
            .limit(5);
        let stages = pipeline(&query, false).unwrap();
        let names = stages
            .iter()
            .filter_map(|stage| stage.keys().next().map(String::as_str))
            .collect::<Vec<_>>();

        assert_eq!(
            names,
            vec!["$lookup", "$unwind", "$match", "$sort", "$skip", "$limit", "$unset"]
        );
    }

    #[test]
    fn count_pipeline_skips_paging() {
        let query = Query::new().filter(Filter::eq("a", 1)).limit(5).offset(2);
        let stages = pipeline(&query, true).unwrap();

        assert_eq!(stages.len(), 2);
        assert_eq!(stages[1], doc! { "$count": "count" });
    }

    #[test]
    fn right_joins_are_rejected() {
        let query = Query::new().join(Join::right("users", "owner", "owner_id", "id"));

        assert!(pipeline(&query, false).is_err());
    }
}
