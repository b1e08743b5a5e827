pub trait Message: Clone + Default + Send + Sync + 'static {}

// blanket impl for all types that meet constraints
impl<T: Clone + Default + Send + Sync + 'static> Message for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::{PoseEstimate, TargetReport};

    #[test]
    fn test_message_trait_imp() {
        fn accepts_message<T: Message>(_: T) {}

        accepts_message(true);
        accepts_message(0.0f32);
        accepts_message(PoseEstimate::default());
        accepts_message(TargetReport::default());
    }
}
