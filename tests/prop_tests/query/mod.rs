mod prop_classify;
